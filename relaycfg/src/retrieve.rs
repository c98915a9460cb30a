//! Multi-target retrieval.
//!
//! A [`RetrievalRequest`] names one jump host and one or more targets.
//! Each target runs as its own pipeline (connect, drive or probe,
//! sanitize) and ends up as one [`TargetOutcome`]; a failed target never
//! affects the others.

use std::fmt;

use futures_util::stream::{self, StreamExt};
use log::{debug, info};
use secrecy::SecretString;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::device::{Sanitizer, detect_hostname};
use crate::driver::{
    CapturedConfig, HIDDEN_INPUT, Prober, RelaySession, RelayTargetBuilder, Transcript,
};
use crate::error::{AttemptDiagnostics, Error, ErrorKind, RelayError, Result};
use crate::platform::{CommandCatalog, VendorFamily};
use crate::settings::{RetrievalMode, Settings};
use crate::transport::Connector;

/// Credentials and addresses for one retrieval run. Immutable once built.
#[derive(Clone)]
pub struct RetrievalRequest {
    jump_host: String,
    jump_user: String,
    jump_password: SecretString,
    targets: Vec<String>,
    target_user: String,
    target_password: Option<SecretString>,
    vendor: Option<VendorFamily>,
}

impl RetrievalRequest {
    /// `targets` is a single address or a comma-separated list.
    pub fn new(
        jump_host: impl Into<String>,
        jump_user: impl Into<String>,
        jump_password: SecretString,
        targets: &str,
        target_user: impl Into<String>,
        target_password: Option<SecretString>,
    ) -> Result<Self> {
        let targets: Vec<String> = targets
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            return Err(RelayError::InvalidRequest("at least one target address is required".into()).into());
        }
        Ok(Self {
            jump_host: jump_host.into(),
            jump_user: jump_user.into(),
            jump_password,
            targets,
            target_user: target_user.into(),
            target_password,
            vendor: None,
        })
    }

    /// Restrict every target to one vendor family.
    pub fn with_vendor(mut self, vendor: Option<VendorFamily>) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn jump_host(&self) -> &str {
        &self.jump_host
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// `user@host` of the jump host.
    pub fn relay_identity(&self) -> String {
        format!("{}@{}", self.jump_user, self.jump_host)
    }
}

impl fmt::Debug for RetrievalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalRequest")
            .field("jump_host", &self.jump_host)
            .field("jump_user", &self.jump_user)
            .field("jump_password", &HIDDEN_INPUT)
            .field("targets", &self.targets)
            .field("target_user", &self.target_user)
            .field("target_password", &self.target_password.as_ref().map(|_| HIDDEN_INPUT))
            .field("vendor", &self.vendor)
            .finish()
    }
}

/// What happened to one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub target: String,

    /// Display hostname detected in the configuration.
    pub hostname: Option<String>,

    /// Sanitized configuration text.
    pub config: Option<String>,

    /// Retrieval metadata (command, completion, validation).
    pub captured: Option<CapturedConfig>,

    /// Failure category, when the target failed.
    pub error: Option<ErrorKind>,

    /// Failure detail, when the target failed.
    pub message: Option<String>,

    /// stdout and stderr of the last rejected attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<AttemptDiagnostics>,

    pub transcript: Transcript,
}

impl TargetOutcome {
    fn failed(target: &str, kind: ErrorKind, message: String, transcript: Transcript) -> Self {
        Self {
            target: target.to_string(),
            hostname: None,
            config: None,
            captured: None,
            error: Some(kind),
            message: Some(message),
            diagnostics: None,
            transcript,
        }
    }

    fn from_error(target: &str, error: &Error, transcript: Transcript) -> Self {
        Self {
            diagnostics: error.diagnostics().cloned(),
            ..Self::failed(target, error.kind(), error.to_string(), transcript)
        }
    }

    pub fn is_success(&self) -> bool {
        self.config.is_some()
    }

    /// Saved output may be truncated.
    pub fn is_incomplete(&self) -> bool {
        self.captured.as_ref().is_some_and(CapturedConfig::is_incomplete)
    }

    /// Failure kind, or [`ErrorKind::Incomplete`] for a truncated success.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error
            .or_else(|| self.is_incomplete().then_some(ErrorKind::Incomplete))
    }

    /// One-line reason for a failed target.
    pub fn reason(&self) -> String {
        match (self.error, &self.message) {
            (Some(kind), Some(message)) => format!("{kind}: {message}"),
            (Some(kind), None) => kind.to_string(),
            _ => String::new(),
        }
    }
}

/// Per-target outcomes in request order.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    /// At least one target succeeded.
    pub success: bool,
    pub targets: Vec<TargetOutcome>,
}

impl RetrievalResult {
    fn new(targets: Vec<TargetOutcome>) -> Self {
        Self {
            success: targets.iter().any(TargetOutcome::is_success),
            targets,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.targets.iter().filter(|t| t.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.targets.iter().filter(|t| !t.is_success())
    }

    /// Every target failed (an empty result counts as failed).
    pub fn all_failed(&self) -> bool {
        !self.success
    }
}

/// Runs retrievals for a request.
pub struct Retriever<'a, C> {
    connector: &'a C,
    settings: &'a Settings,
    catalog: CommandCatalog,
    cancel: CancellationToken,
}

impl<'a, C: Connector> Retriever<'a, C> {
    pub fn new(connector: &'a C, settings: &'a Settings, cancel: CancellationToken) -> Self {
        Self {
            connector,
            settings,
            catalog: CommandCatalog::builtin(),
            cancel,
        }
    }

    /// Probe with a custom catalog instead of the built-in one.
    pub fn with_catalog(mut self, catalog: CommandCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Retrieve every target, at most `relay.max_concurrent` at a time.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResult {
        let concurrency = self.settings.relay.max_concurrent.max(1);
        info!(
            "retrieving {} target(s) via {} ({:?} mode, {} at a time)",
            request.targets().len(),
            request.relay_identity(),
            self.settings.relay.mode,
            concurrency
        );

        let outcomes = stream::iter(request.targets().iter().map(|t| self.retrieve_one(request, t)))
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;

        let result = RetrievalResult::new(outcomes);
        info!(
            "retrieval finished: {} succeeded, {} failed",
            result.succeeded().count(),
            result.failed().count()
        );
        result
    }

    async fn retrieve_one(&self, request: &RetrievalRequest, address: &str) -> TargetOutcome {
        let target = RelayTargetBuilder::new(request.jump_host.clone())
            .jump_port(self.settings.relay.port)
            .jump_user(request.jump_user.clone())
            .jump_secret(request.jump_password.clone())
            .target(address)
            .target_user(request.target_user.clone())
            .target_secret(request.target_password.clone())
            .vendor(request.vendor)
            .build();
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                let mut transcript = Transcript::new(address);
                transcript.error(e.to_string());
                return TargetOutcome::from_error(address, &e, transcript);
            }
        };

        let (result, transcript) = match self.settings.relay.mode {
            RetrievalMode::Shell => {
                let mut session = RelaySession::new(self.connector, &target, self.settings, self.cancel.clone());
                let result = session.run().await;
                (result, session.into_transcript())
            }
            RetrievalMode::Probe => {
                let mut transcript = Transcript::new(address);
                let prober = Prober::new(&self.catalog, self.settings, self.cancel.clone());
                let result = prober.run(self.connector, &target, &mut transcript).await;
                (result, transcript)
            }
        };

        match result {
            Ok(captured) => finish(captured, transcript),
            Err(e) => TargetOutcome::from_error(address, &e, transcript),
        }
    }
}

/// Sanitize the captured output and fill in the hostname.
fn finish(captured: CapturedConfig, mut transcript: Transcript) -> TargetOutcome {
    let clean = Sanitizer::new()
        .with_echo(&captured.command)
        .with_prompt(captured.prompt.as_deref())
        .sanitize(&captured.raw);
    debug!(
        "[{}] sanitized {} -> {} bytes",
        captured.target,
        captured.raw.len(),
        clean.len()
    );

    if clean.is_empty() {
        let message = "output was empty after removing shell noise".to_string();
        transcript.error(format!("{}: {}", ErrorKind::NoValidConfigFound, message));
        return TargetOutcome::failed(&captured.target, ErrorKind::NoValidConfigFound, message, transcript);
    }

    let hostname = detect_hostname(&clean);
    match &hostname {
        Some(name) => transcript.note(format!("hostname: {name}")),
        None => transcript.warn("hostname not detected"),
    }
    if captured.is_incomplete() {
        transcript.warn(format!("{} ({:?})", ErrorKind::Incomplete, captured.completion));
    }

    TargetOutcome {
        target: captured.target.clone(),
        hostname,
        config: Some(clean),
        captured: Some(captured),
        error: None,
        message: None,
        diagnostics: None,
        transcript,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::testing::{Reply, ScriptLog, ScriptedConnection, ScriptedConnector, ScriptedShell};
    use crate::transport::ExecOutput;

    const JUNOS: &str = "set version 18.2R3\n\
                         set system host-name sw-a\n\
                         set interfaces ge-0/0/1 unit 0 family ethernet-switching interface-mode access\n\
                         set protocols lldp interface all\n";

    fn request(targets: &str) -> RetrievalRequest {
        tokio_test::assert_ok!(RetrievalRequest::new(
            "bastion",
            "ops",
            SecretString::from("jp".to_string()),
            targets,
            "admin",
            Some(SecretString::from("tp".to_string())),
        ))
    }

    fn probe_settings() -> Settings {
        let mut settings = Settings::default();
        settings.relay.mode = RetrievalMode::Probe;
        settings
    }

    fn ok(stdout: &str) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        }
    }

    #[test]
    fn test_request_targets() {
        let request = request(" 10.0.0.1, ,10.0.0.2 ,");
        assert_eq!(request.targets(), ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(request.relay_identity(), "ops@bastion");

        let err = tokio_test::assert_err!(RetrievalRequest::new(
            "b",
            "u",
            SecretString::from("p".to_string()),
            " , ",
            "a",
            None
        ));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_partial_success_keeps_order() {
        let log = ScriptLog::default();
        let connector = ScriptedConnector::new(vec![
            ScriptedConnection::with_exec(vec![ok(JUNOS)], &log),
            ScriptedConnection::with_exec(vec![], &log),
        ]);
        let settings = probe_settings();
        let retriever = Retriever::new(&connector, &settings, CancellationToken::new())
            .with_catalog(CommandCatalog::builtin().restricted_to(Some(VendorFamily::Juniper)));

        let result = retriever.retrieve(&request("10.0.0.1,10.0.0.2")).await;

        assert!(result.success);
        assert!(!result.all_failed());
        assert_eq!(result.targets.len(), 2);

        let first = &result.targets[0];
        assert_eq!(first.target, "10.0.0.1");
        assert!(first.is_success());
        assert_eq!(first.hostname.as_deref(), Some("sw-a"));
        assert_eq!(first.kind(), None);
        assert!(first.config.as_deref().unwrap().starts_with("set version 18.2R3"));

        let second = &result.targets[1];
        assert_eq!(second.target, "10.0.0.2");
        assert!(!second.is_success());
        assert_eq!(second.error, Some(ErrorKind::NoValidConfigFound));
        assert!(second.reason().starts_with(ErrorKind::NoValidConfigFound.describe()));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_stderr() {
        let log = ScriptLog::default();
        let refused = ExecOutput {
            stdout: String::new(),
            stderr: "Unable to negotiate with 10.0.0.1 port 22: no matching cipher found".into(),
            exit_status: Some(255),
        };
        let connector = ScriptedConnector::new(vec![ScriptedConnection::with_exec(vec![refused], &log)]);
        let settings = probe_settings();
        let retriever = Retriever::new(&connector, &settings, CancellationToken::new())
            .with_catalog(CommandCatalog::builtin().restricted_to(Some(VendorFamily::Cisco)));

        let result = retriever.retrieve(&request("10.0.0.1")).await;
        let outcome = &result.targets[0];
        assert_eq!(outcome.error, Some(ErrorKind::NoValidConfigFound));

        let diagnostics = outcome.diagnostics.as_ref().unwrap();
        assert_eq!(diagnostics.exit_status, Some(255));
        assert!(diagnostics.command.contains("'********'"));
        // only the first attempt was scripted; the last one got the fallback
        assert_eq!(diagnostics.stderr, "no scripted output left");
        assert!(outcome
            .transcript
            .to_string()
            .contains("no matching cipher found"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json["targets"][0]["diagnostics"]["stderr"],
            "no scripted output left"
        );
    }

    #[tokio::test]
    async fn test_all_failed() {
        let connector = ScriptedConnector::refusing();
        let settings = Settings::default();
        let retriever = Retriever::new(&connector, &settings, CancellationToken::new());

        let result = retriever.retrieve(&request("10.0.0.1,10.0.0.2")).await;
        assert!(result.all_failed());
        assert!(result
            .targets
            .iter()
            .all(|t| t.error == Some(ErrorKind::Unreachable)));
        assert!(!result.targets[0].transcript.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_targets() {
        let log = ScriptLog::default();
        let connector = ScriptedConnector::new(vec![
            ScriptedConnection::with_exec(vec![ok(JUNOS)], &log),
            ScriptedConnection::with_exec(vec![ok(JUNOS)], &log),
            ScriptedConnection::with_exec(vec![ok(JUNOS)], &log),
        ]);
        let mut settings = probe_settings();
        settings.relay.max_concurrent = 3;
        let retriever = Retriever::new(&connector, &settings, CancellationToken::new());

        let result = retriever.retrieve(&request("10.0.0.1,10.0.0.2,10.0.0.3")).await;
        let order: Vec<&str> = result.targets.iter().map(|t| t.target.as_str()).collect();
        assert_eq!(order, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(result.succeeded().count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let connector = ScriptedConnector::new(vec![]);
        let settings = Settings::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let retriever = Retriever::new(&connector, &settings, cancel);

        let result = retriever.retrieve(&request("10.0.0.1")).await;
        assert_eq!(result.targets[0].error, Some(ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_shell_mode_incomplete_is_flagged() {
        let log = ScriptLog::default();
        let shell = ScriptedShell::new(vec![Reply::now("[ops@bastion ~]$ ")])
            .on("ssh ", vec![Reply::now("admin@10.0.0.1's password: ")])
            .on_hidden("tp", vec![Reply::now("admin@sw-a> ")])
            .on("set cli screen-length", vec![Reply::now("admin@sw-a> ")])
            .on(
                "show configuration",
                vec![
                    Reply::now(JUNOS),
                    Reply::after(Duration::from_millis(30), "set interfaces ge-0/0/2 description a\n"),
                    Reply::after(Duration::from_millis(30), "set interfaces ge-0/0/3 description b\n"),
                    Reply::after(Duration::from_millis(30), "set interfaces ge-0/0/4 description c\n"),
                    Reply::after(Duration::from_millis(30), "set interfaces ge-0/0/5 description d\n"),
                ],
            )
            .stay_open();
        let connector = ScriptedConnector::new(vec![ScriptedConnection::with_shell(shell, &log)]);
        let mut settings = Settings::default();
        settings.timeouts.cli = Duration::from_millis(100);
        settings.timeouts.collect_deadline = Duration::from_millis(100);
        settings.timeouts.collect_idle = Duration::from_millis(500);
        let retriever = Retriever::new(&connector, &settings, CancellationToken::new());

        let result = retriever.retrieve(&request("10.0.0.1")).await;
        let outcome = &result.targets[0];
        assert!(outcome.is_success());
        assert!(outcome.is_incomplete());
        assert_eq!(outcome.kind(), Some(ErrorKind::Incomplete));
        assert!(outcome.config.as_deref().unwrap().contains("set system host-name sw-a"));
        assert!(log.connection_closed());
    }
}
