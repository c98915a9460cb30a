//! Error types for relaycfg.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for relaycfg operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Relay automaton and probing errors
    #[error("{0}")]
    Relay(#[from] RelayError),

    /// Settings loading errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Local I/O (persisting output, reading saved configs)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts under strict verification
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (shell channel and exec channels).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// Remote command finished without reporting an exit status
    #[error("Command did not report an exit status")]
    NoExitStatus,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Failures of the relay automaton or the command prober.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Network-level failure reaching the jump host or the target.
    #[error("{host} unreachable: {detail}")]
    Unreachable { host: String, detail: String },

    /// Credentials refused at either hop.
    #[error("authentication rejected by {host}: {detail}")]
    AuthRejected { host: String, detail: String },

    /// The target asked for a password and none was supplied.
    #[error("{host} requires a password but none was supplied")]
    CredentialsRequired { host: String },

    /// Every command variant was tried without a validated result.
    #[error("no valid configuration found on {target} after {attempts} attempt(s)")]
    NoValidConfigFound {
        target: String,
        attempts: usize,
        /// Diagnostics of the last attempt, never discarded.
        last: Option<Box<AttemptDiagnostics>>,
    },

    /// The caller cancelled the retrieval.
    #[error("retrieval cancelled")]
    Cancelled,

    /// The retrieval request is missing a required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A state transition that the automaton does not allow.
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Raw output kept from the last rejected probe attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDiagnostics {
    /// Command as it was logged (password masked).
    pub command: String,
    pub exit_status: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub reason: String,
}

/// Settings loading errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`](crate::Settings).
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A pattern in the settings does not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Operator-facing failure categories.
///
/// Each kind maps to one distinct message category so the transcript alone
/// is enough to tell what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    AuthRejected,
    CredentialsRequired,
    NoValidConfigFound,
    Incomplete,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Human-readable category message.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Unreachable => "device or relay unreachable (check address and network path)",
            Self::AuthRejected => "authentication rejected (check username and password)",
            Self::CredentialsRequired => "password required but not supplied",
            Self::NoValidConfigFound => "no command variant returned a valid configuration",
            Self::Incomplete => "output incomplete: no prompt seen before the deadline",
            Self::Cancelled => "retrieval cancelled",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl Error {
    /// Output of the last rejected attempt, when every attempt failed.
    pub fn diagnostics(&self) -> Option<&AttemptDiagnostics> {
        match self {
            Self::Relay(RelayError::NoValidConfigFound { last, .. }) => last.as_deref(),
            _ => None,
        }
    }

    /// Operator-facing category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Relay(e) => match e {
                RelayError::Unreachable { .. } => ErrorKind::Unreachable,
                RelayError::AuthRejected { .. } => ErrorKind::AuthRejected,
                RelayError::CredentialsRequired { .. } => ErrorKind::CredentialsRequired,
                RelayError::NoValidConfigFound { .. } => ErrorKind::NoValidConfigFound,
                RelayError::Cancelled => ErrorKind::Cancelled,
                RelayError::InvalidRequest(_) | RelayError::InvalidTransition { .. } => {
                    ErrorKind::Internal
                }
            },
            Self::Transport(TransportError::AuthenticationFailed { .. }) => ErrorKind::AuthRejected,
            Self::Transport(TransportError::KnownHosts(_)) => ErrorKind::Internal,
            Self::Transport(_) | Self::Channel(_) => ErrorKind::Unreachable,
            Self::Settings(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias using relaycfg's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: Error = RelayError::CredentialsRequired {
            host: "10.0.0.1".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::CredentialsRequired);

        let err: Error = TransportError::AuthenticationFailed {
            user: "ops".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::AuthRejected);

        let err: Error = TransportError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[test]
    fn test_kind_messages_are_distinct() {
        let kinds = [
            ErrorKind::Unreachable,
            ErrorKind::AuthRejected,
            ErrorKind::CredentialsRequired,
            ErrorKind::NoValidConfigFound,
            ErrorKind::Incomplete,
            ErrorKind::Cancelled,
            ErrorKind::Internal,
        ];
        let messages: std::collections::HashSet<_> = kinds.iter().map(|k| k.describe()).collect();
        assert_eq!(messages.len(), kinds.len());
    }
}
