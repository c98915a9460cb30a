//! Command-variant prober.
//!
//! Instead of driving a shell, each [`CommandAttempt`] is exec'd on the
//! jump host as a one-shot `sshpass ... ssh` and its output is checked by
//! the attempt's validator. The first validated attempt wins.

use log::debug;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use super::builder::RelayTarget;
use super::response::CapturedConfig;
use super::session::{shell_quote, shell_word};
use super::transcript::{HIDDEN_INPUT, Transcript};
use super::{cancellable, connect};
use crate::channel::Completion;
use crate::error::{AttemptDiagnostics, Error, RelayError, Result, TransportError};
use crate::platform::{CommandAttempt, CommandCatalog, MIN_CONFIG_LEN};
use crate::settings::Settings;
use crate::transport::{Connector, ExecOutput, RelayConnection};

/// stderr markers that make an attempt worthless whatever it printed.
pub const CRITICAL_SSH_ERRORS: &[&str] = &[
    "no matching cipher",
    "connection refused",
    "permission denied",
    "host key verification failed",
    "could not resolve hostname",
];

/// Characters of stderr copied into the transcript per attempt.
const STDERR_SAMPLE: usize = 500;

/// Build the exec line for one attempt.
pub fn hop_exec_command(
    password: &str,
    options: &[String],
    user: &str,
    host: &str,
    remote_command: &str,
) -> String {
    let mut parts = vec![
        "sshpass".to_string(),
        "-p".to_string(),
        shell_quote(password),
        "ssh".to_string(),
    ];
    parts.extend(options.iter().cloned());
    parts.push(shell_word(&format!("{user}@{host}")));
    parts.push(shell_quote(remote_command));
    parts.join(" ")
}

/// Why an attempt was rejected, or `None` if it passed.
fn reject_reason(attempt: &CommandAttempt, output: &ExecOutput) -> Option<String> {
    match output.exit_status {
        Some(0) => {}
        Some(status) => return Some(format!("exit status {status}")),
        None => return Some("no exit status reported".into()),
    }
    let len = output.stdout.trim().chars().count();
    if len < MIN_CONFIG_LEN {
        return Some(format!("output too short ({len} chars)"));
    }
    let stderr = output.stderr.to_lowercase();
    if let Some(marker) = CRITICAL_SSH_ERRORS.iter().find(|m| stderr.contains(*m)) {
        return Some(format!("critical ssh error: {marker}"));
    }
    let validation = attempt.validator.validate(&output.stdout);
    if !validation.is_accepted() {
        return Some(format!("content not valid for {} ({:?})", attempt.family, validation));
    }
    None
}

/// Tries the catalog in order on one jump-host connection.
pub struct Prober<'a> {
    catalog: &'a CommandCatalog,
    settings: &'a Settings,
    cancel: CancellationToken,
}

impl<'a> Prober<'a> {
    pub fn new(catalog: &'a CommandCatalog, settings: &'a Settings, cancel: CancellationToken) -> Self {
        Self {
            catalog,
            settings,
            cancel,
        }
    }

    /// Connect to the jump host, probe, and always disconnect.
    pub async fn run<C: Connector>(
        &self,
        connector: &C,
        target: &RelayTarget,
        transcript: &mut Transcript,
    ) -> Result<CapturedConfig> {
        let config = target.jump_config(self.settings);
        transcript.note(format!(
            "connecting to jump host {} as {}",
            config.socket_addr(),
            config.username
        ));
        let result = match connect(connector, &config, &self.cancel).await {
            Ok(mut connection) => {
                let result = self.probe(&mut connection, target, transcript).await;
                if let Err(e) = connection.close().await {
                    debug!("closing jump connection: {}", e);
                }
                transcript.note("jump connection closed");
                result
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            transcript.error(format!("{}: {}", e.kind(), e));
        }
        result
    }

    /// Probe on an established connection.
    pub async fn probe<R: RelayConnection>(
        &self,
        connection: &mut R,
        target: &RelayTarget,
        transcript: &mut Transcript,
    ) -> Result<CapturedConfig> {
        let host = target.target_host();
        let Some(password) = target.target_password() else {
            return Err(RelayError::CredentialsRequired { host: host.to_string() }.into());
        };
        let catalog = self.catalog.clone().restricted_to(target.vendor());
        let options = &self.settings.relay.hop_options;
        let timeout = self.settings.timeouts.probe;
        let total = catalog.len();

        let mut last: Option<AttemptDiagnostics> = None;
        for (index, attempt) in catalog.iter().enumerate() {
            transcript.note(format!("attempt {}/{}: {}", index + 1, total, attempt.label));
            let command = hop_exec_command(
                password.expose_secret(),
                options,
                target.target_user(),
                host,
                &attempt.command,
            );
            let logged = hop_exec_command(HIDDEN_INPUT, options, target.target_user(), host, &attempt.command);
            transcript.sent(&logged);

            let output = match cancellable(&self.cancel, connection.exec(&command, timeout)).await {
                Ok(output) => output,
                Err(Error::Transport(TransportError::Timeout(after))) => {
                    let reason = format!("timed out after {:?}", after);
                    transcript.warn(format!("rejected: {}", reason));
                    last = Some(AttemptDiagnostics {
                        command: logged,
                        exit_status: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        reason,
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            transcript.note(format!(
                "exit status {}, {} bytes of output, {} bytes of stderr",
                output
                    .exit_status
                    .map_or_else(|| "none".to_string(), |s| s.to_string()),
                output.stdout.len(),
                output.stderr.len()
            ));
            let stderr = output.stderr.trim();
            if !stderr.is_empty() {
                let sample: String = stderr.chars().take(STDERR_SAMPLE).collect();
                transcript.warn(format!("stderr: {}", sample));
            }

            match reject_reason(attempt, &output) {
                None => {
                    transcript.note(format!("valid {} configuration found", attempt.family));
                    return Ok(CapturedConfig {
                        target: host.to_string(),
                        command: attempt.command.clone(),
                        family: attempt.family,
                        bytes: output.stdout.len(),
                        validation: attempt.validator.validate(&output.stdout),
                        raw: output.stdout,
                        completion: Completion::Exited,
                        prompt: None,
                        elapsed: transcript.elapsed(),
                    });
                }
                Some(reason) => {
                    let sample: String = output.stdout.chars().take(200).collect();
                    transcript.warn(format!("rejected: {} (sample: {:?})", reason, sample));
                    last = Some(AttemptDiagnostics {
                        command: logged,
                        exit_status: output.exit_status,
                        stdout: output.stdout,
                        stderr: output.stderr,
                        reason,
                    });
                }
            }
        }

        Err(RelayError::NoValidConfigFound {
            target: host.to_string(),
            attempts: total,
            last: last.map(Box::new),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RelayTargetBuilder;
    use crate::driver::testing::{ScriptLog, ScriptedConnection, ScriptedConnector};
    use crate::error::ErrorKind;
    use crate::platform::{VendorFamily, vendors};

    const CISCO_SAMPLE: &str = "Building configuration...\n\
                                !\n\
                                hostname access-sw3\n\
                                !\n\
                                interface GigabitEthernet1/0/1\n \
                                switchport mode access\n \
                                switchport access vlan 10\n\
                                !\n\
                                interface Vlan10\n \
                                ip address 192.168.10.5 255.255.255.0\n";

    fn target() -> RelayTarget {
        RelayTargetBuilder::new("bastion")
            .jump_user("ops")
            .jump_password("jp")
            .target("10.0.0.9")
            .target_user("admin")
            .target_password("s3cr'et")
            .build()
            .unwrap()
    }

    /// The three-attempt catalog: Junos set, Junos plain, Cisco.
    fn three_attempts() -> CommandCatalog {
        CommandCatalog::new(vec![
            CommandAttempt::new(
                VendorFamily::Juniper,
                "junos set",
                vendors::juniper::DISPLAY_SET,
                vendors::juniper::set_validator(),
            ),
            CommandAttempt::new(
                VendorFamily::Juniper,
                "junos plain",
                vendors::juniper::DISPLAY_PLAIN,
                vendors::juniper::hierarchical_validator(),
            ),
            CommandAttempt::new(
                VendorFamily::Cisco,
                "cisco",
                vendors::cisco::RUNNING_CONFIG,
                vendors::cisco::validator(),
            ),
        ])
    }

    fn exec(stdout: &str, stderr: &str, status: u32) -> ExecOutput {
        ExecOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: Some(status),
        }
    }

    #[test]
    fn test_exec_command_quoting() {
        let options = vec!["-o StrictHostKeyChecking=no".to_string()];
        assert_eq!(
            hop_exec_command("p'w", &options, "admin", "10.0.0.9", "cli -c \"show configuration | no-more\""),
            r#"sshpass -p 'p'\''w' ssh -o StrictHostKeyChecking=no admin@10.0.0.9 'cli -c "show configuration | no-more"'"#
        );
        assert!(hop_exec_command(HIDDEN_INPUT, &options, "admin", "h", "x").starts_with("sshpass -p '********' "));
    }

    #[tokio::test]
    async fn test_falls_back_to_cisco() {
        let log = ScriptLog::default();
        let connection = ScriptedConnection::with_exec(
            vec![
                exec("", "", 0),
                exec("syntax error, expecting <command>.\nsome more text to pass the length check", "", 0),
                exec(CISCO_SAMPLE, "", 0),
            ],
            &log,
        );
        let connector = ScriptedConnector::new(vec![connection]);
        let settings = Settings::default();
        let catalog = three_attempts();
        let prober = Prober::new(&catalog, &settings, CancellationToken::new());
        let mut transcript = Transcript::new("10.0.0.9");

        let captured = prober.run(&connector, &target(), &mut transcript).await.unwrap();
        assert_eq!(captured.family, VendorFamily::Cisco);
        assert_eq!(captured.command, "show running-config");
        assert_eq!(captured.completion, Completion::Exited);
        assert!(!captured.is_incomplete());

        let execs = log.execs();
        assert_eq!(execs.len(), 3);
        assert!(execs[2].ends_with("'show running-config'"));
        assert!(log.connection_closed());
        assert!(!transcript.to_string().contains("s3cr"));
    }

    #[tokio::test]
    async fn test_stops_at_first_valid() {
        let log = ScriptLog::default();
        let junos = "set system host-name sw1\nset interfaces ge-0/0/1 unit 0 family ethernet-switching\n";
        let connection = ScriptedConnection::with_exec(vec![exec(junos, "", 0)], &log);
        let connector = ScriptedConnector::new(vec![connection]);
        let settings = Settings::default();
        let catalog = CommandCatalog::builtin();
        let prober = Prober::new(&catalog, &settings, CancellationToken::new());
        let mut transcript = Transcript::new("10.0.0.9");

        let captured = prober.run(&connector, &target(), &mut transcript).await.unwrap();
        assert_eq!(captured.family, VendorFamily::Juniper);
        assert_eq!(log.execs().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_keeps_last_diagnostics() {
        let log = ScriptLog::default();
        let connection = ScriptedConnection::with_exec(
            vec![
                exec("", "Permission denied, please try again.", 5),
                exec("", "Permission denied, please try again.", 5),
                exec("", "ssh: connect to host 10.0.0.9: Connection refused", 255),
            ],
            &log,
        );
        let connector = ScriptedConnector::new(vec![connection]);
        let settings = Settings::default();
        let catalog = three_attempts();
        let prober = Prober::new(&catalog, &settings, CancellationToken::new());
        let mut transcript = Transcript::new("10.0.0.9");

        let err = prober.run(&connector, &target(), &mut transcript).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidConfigFound);
        match err {
            Error::Relay(RelayError::NoValidConfigFound { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                let last = last.unwrap();
                assert_eq!(last.exit_status, Some(255));
                assert!(last.stderr.contains("Connection refused"));
                assert!(last.command.contains("'********'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        let transcript = transcript.to_string();
        assert!(transcript.contains("stderr: Permission denied, please try again."));
        assert!(transcript.contains("stderr: ssh: connect to host 10.0.0.9: Connection refused"));
        assert!(log.connection_closed());
    }

    #[test]
    fn test_critical_stderr_rejects() {
        let attempt = &three_attempts().iter().nth(2).cloned().unwrap();
        let output = exec(CISCO_SAMPLE, "no matching cipher found", 0);
        assert_eq!(
            reject_reason(attempt, &output).as_deref(),
            Some("critical ssh error: no matching cipher")
        );
        assert_eq!(reject_reason(attempt, &exec(CISCO_SAMPLE, "", 0)), None);
    }

    #[tokio::test]
    async fn test_vendor_hint_limits_attempts() {
        let log = ScriptLog::default();
        let connection = ScriptedConnection::with_exec(vec![], &log);
        let connector = ScriptedConnector::new(vec![connection]);
        let settings = Settings::default();
        let catalog = CommandCatalog::builtin();
        let prober = Prober::new(&catalog, &settings, CancellationToken::new());
        let mut transcript = Transcript::new("10.0.0.9");
        let target = RelayTargetBuilder::new("bastion")
            .jump_user("ops")
            .jump_password("jp")
            .target("10.0.0.9")
            .target_user("admin")
            .target_password("pw")
            .vendor(Some(VendorFamily::Cisco))
            .build()
            .unwrap();

        let err = prober.run(&connector, &target, &mut transcript).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidConfigFound);
        assert_eq!(log.execs().len(), 2);
    }
}
