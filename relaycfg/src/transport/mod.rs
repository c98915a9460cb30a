//! SSH transport layer wrapping russh.
//!
//! This module provides the jump-host connection: password authentication,
//! an interactive PTY shell for the relay automaton and exec channels for
//! the command prober. The [`Connector`] and [`RelayConnection`] traits are
//! the seam where tests substitute a scripted host.

pub mod config;
mod ssh;

use std::future::Future;
use std::time::Duration;

pub use config::{HostKeyVerification, SshConfig};
pub use ssh::{SshConnector, SshTransport};

use crate::channel::ShellIo;
use crate::error::Result;

/// Output of one exec'd command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,

    /// Exit status, if the server reported one.
    pub exit_status: Option<u32>,
}

/// An authenticated connection to the jump host.
pub trait RelayConnection: Send {
    /// Interactive shell channel type.
    type Shell: ShellIo;

    /// Open an interactive shell with a PTY.
    fn open_shell(&mut self) -> impl Future<Output = Result<Self::Shell>> + Send;

    /// Run one command on its own exec channel, bounded by `timeout`.
    fn exec(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ExecOutput>> + Send;

    /// Disconnect.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for jump-host connections.
pub trait Connector: Send + Sync {
    type Connection: RelayConnection;

    /// Connect and authenticate. Bounded by `config.timeout`.
    fn connect(&self, config: &SshConfig) -> impl Future<Output = Result<Self::Connection>> + Send;
}
