//! The relay session automaton.
//!
//! Drives an interactive shell on the jump host through the hop to the
//! target, into the vendor CLI and through the configuration dump. Every
//! step is a bounded wait classified by [`Classifier`]; the channel and the
//! connection are closed on every exit path.

use log::debug;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use super::builder::RelayTarget;
use super::response::CapturedConfig;
use super::state::SessionState;
use super::transcript::Transcript;
use super::{cancellable, connect};
use crate::channel::{
    CapturedOutput, ChannelReader, Classifier, Completion, LearnedPrompt, PromptKind, ShellIo,
    Verdict, WaitOutcome, trailing_prompt,
};
use crate::error::{AttemptDiagnostics, RelayError, Result};
use crate::platform::{VendorFamily, VendorProfile};
use crate::settings::Settings;
use crate::transport::{Connector, RelayConnection};

/// One run of the automaton against one target.
pub struct RelaySession<'a, C> {
    connector: &'a C,
    target: &'a RelayTarget,
    settings: &'a Settings,
    profile: VendorProfile,
    classifier: Classifier,
    cancel: CancellationToken,
    state: SessionState,
    transcript: Transcript,

    /// Trimmed prompt line of the jump host, to notice a hop that fell back.
    jump_prompt: Option<String>,

    /// Prompt of the device once logged in; marks the end of the dump.
    device_prompt: Option<LearnedPrompt>,
}

impl<'a, C: Connector> RelaySession<'a, C> {
    /// Create a session. Without a vendor hint the target is assumed to
    /// run Junos.
    pub fn new(
        connector: &'a C,
        target: &'a RelayTarget,
        settings: &'a Settings,
        cancel: CancellationToken,
    ) -> Self {
        let family = target.vendor().unwrap_or(VendorFamily::Juniper);
        let profile = VendorProfile::for_family(family);
        let classifier = Classifier::new().with_auth_failures(profile.auth_failures.clone());
        Self {
            connector,
            target,
            settings,
            profile,
            classifier,
            cancel,
            state: SessionState::Idle,
            transcript: Transcript::new(target.target_host()),
            jump_prompt: None,
            device_prompt: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(RelayError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.transcript.note(format!("state {} -> {}", self.state, next));
        self.state = next;
        Ok(())
    }

    /// Run the full chain. On failure the session ends in
    /// [`SessionState::Error`] and the transcript says why.
    pub async fn run(&mut self) -> Result<CapturedConfig> {
        let result = self.connect_and_drive().await;
        if let Err(e) = &result {
            self.transcript.error(format!("{}: {}", e.kind(), e));
            if self.state.can_advance_to(SessionState::Error) {
                self.transcript
                    .note(format!("state {} -> {}", self.state, SessionState::Error));
                self.state = SessionState::Error;
            }
        }
        result
    }

    async fn connect_and_drive(&mut self) -> Result<CapturedConfig> {
        let config = self.target.jump_config(self.settings);
        self.transcript.note(format!(
            "connecting to jump host {} as {}",
            config.socket_addr(),
            config.username
        ));
        let mut connection = connect(self.connector, &config, &self.cancel).await?;
        self.transition(SessionState::JumpConnected)?;

        let result = self.drive(&mut connection).await;

        if let Err(e) = connection.close().await {
            debug!("closing jump connection: {}", e);
        }
        self.transcript.note("jump connection closed");
        result
    }

    async fn drive(&mut self, connection: &mut C::Connection) -> Result<CapturedConfig> {
        let mut shell = cancellable(&self.cancel, connection.open_shell()).await?;
        self.transition(SessionState::ShellOpened)?;

        let cancel = self.cancel.clone();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let result = self.drive_shell(&mut reader).await;
        if !cancel.is_cancelled() {
            self.leave(&mut reader).await;
        }
        drop(reader);

        if let Err(e) = shell.shutdown().await {
            debug!("closing shell channel: {}", e);
        }
        result
    }

    async fn drive_shell<S: ShellIo>(
        &mut self,
        reader: &mut ChannelReader<'_, S>,
    ) -> Result<CapturedConfig> {
        self.await_jump_prompt(reader).await?;
        let landing = self.hop(reader).await?;
        self.enter_cli(reader, landing).await?;
        self.dump(reader).await
    }

    /// Login confirmation on the jump host. A missing prompt is only a
    /// warning: some jump hosts print nothing until a key is pressed.
    async fn await_jump_prompt<S: ShellIo>(&mut self, reader: &mut ChannelReader<'_, S>) -> Result<()> {
        let budget = self.settings.timeouts.step;
        let mut out = CapturedOutput::new(budget);
        let classifier = &self.classifier;
        let outcome = reader.wait_for(&mut out, |o| classifier.classify(o)).await?;

        let host = self.target.jump_host();
        match outcome {
            WaitOutcome::Matched(Verdict::Prompt(_)) => {
                let prompt = out.last_line().trim().to_string();
                self.transcript.note(format!(
                    "jump host ready at '{}' ({} bytes of banner)",
                    prompt,
                    out.bytes_received()
                ));
                self.jump_prompt = Some(prompt);
                Ok(())
            }
            WaitOutcome::Matched(Verdict::Unreachable(detail)) => Err(unreachable(host, detail)),
            WaitOutcome::Matched(Verdict::AuthRejected(detail)) => Err(auth_rejected(host, detail)),
            WaitOutcome::Matched(Verdict::PasswordPrompt | Verdict::HostKeyQuestion) => Err(auth_rejected(
                host,
                "jump host asked for more input after login".into(),
            )),
            WaitOutcome::TimedOut => {
                self.transcript
                    .warn(format!("no prompt from the jump host within {:?}, continuing", budget));
                Ok(())
            }
            WaitOutcome::Closed => Err(unreachable(host, "jump shell closed during login".into())),
        }
    }

    fn hop_command(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.settings.relay.hop_options.iter().cloned());
        parts.push(shell_word(&format!(
            "{}@{}",
            self.target.target_user(),
            self.target.target_host()
        )));
        parts.join(" ")
    }

    /// Issue the hop and classify what comes back. Returns the kind of the
    /// prompt the target presented.
    async fn hop<S: ShellIo>(&mut self, reader: &mut ChannelReader<'_, S>) -> Result<PromptKind> {
        let command = self.hop_command();
        reader.send_line(&command).await?;
        self.transcript.sent(&command);
        self.transition(SessionState::HopCommandSent)?;

        // The inner ssh has its own connect timeout; leave it room to report.
        let budget = self.settings.timeouts.connect + self.settings.timeouts.step;
        let host = self.target.target_host();
        let mut answered_host_key = false;
        loop {
            let mut out = CapturedOutput::new(budget);
            let classifier = &self.classifier;
            let outcome = reader.wait_for(&mut out, |o| classifier.classify(o)).await?;

            match outcome {
                WaitOutcome::Matched(Verdict::HostKeyQuestion) if !answered_host_key => {
                    answered_host_key = true;
                    reader.send_line("yes").await?;
                    self.transcript.sent("yes");
                    self.transcript.note("accepted the target host key");
                }
                WaitOutcome::Matched(Verdict::HostKeyQuestion) => {
                    return Err(unreachable(host, "host key confirmation asked twice".into()));
                }
                WaitOutcome::Matched(Verdict::PasswordPrompt) => {
                    self.transition(SessionState::AwaitingTargetAuth)?;
                    return self.authenticate(reader).await;
                }
                WaitOutcome::Matched(Verdict::Prompt(kind)) => {
                    self.check_left_jump_host(&out)?;
                    self.learn_prompt(&out);
                    self.transcript.note("target accepted the hop without a password");
                    self.transition(SessionState::TargetAuthenticated)?;
                    return Ok(kind);
                }
                WaitOutcome::Matched(Verdict::Unreachable(detail)) => return Err(unreachable(host, detail)),
                WaitOutcome::Matched(Verdict::AuthRejected(detail)) => return Err(auth_rejected(host, detail)),
                WaitOutcome::TimedOut => {
                    return Err(unreachable(host, format!("no answer to the hop within {:?}", budget)));
                }
                WaitOutcome::Closed => {
                    return Err(unreachable(host, "jump shell closed during the hop".into()));
                }
            }
        }
    }

    async fn authenticate<S: ShellIo>(&mut self, reader: &mut ChannelReader<'_, S>) -> Result<PromptKind> {
        let target = self.target;
        let host = target.target_host();
        let Some(password) = target.target_password() else {
            return Err(RelayError::CredentialsRequired { host: host.to_string() }.into());
        };

        reader.send_line(password.expose_secret()).await?;
        self.transcript.sent_hidden();

        let budget = self.settings.timeouts.auth;
        let mut out = CapturedOutput::new(budget);
        let classifier = &self.classifier;
        let outcome = reader.wait_for(&mut out, |o| classifier.classify(o)).await?;

        match outcome {
            WaitOutcome::Matched(Verdict::Prompt(kind)) => {
                self.check_left_jump_host(&out)?;
                self.learn_prompt(&out);
                self.transcript.note(format!("logged in to {}", host));
                self.transition(SessionState::TargetAuthenticated)?;
                Ok(kind)
            }
            WaitOutcome::Matched(Verdict::PasswordPrompt) => {
                Err(auth_rejected(host, "password prompt repeated".into()))
            }
            WaitOutcome::Matched(Verdict::AuthRejected(detail)) => Err(auth_rejected(host, detail)),
            WaitOutcome::Matched(Verdict::Unreachable(detail)) => Err(unreachable(host, detail)),
            WaitOutcome::Matched(Verdict::HostKeyQuestion) => Err(unreachable(
                host,
                "unexpected host key question after the password".into(),
            )),
            WaitOutcome::TimedOut => Err(unreachable(
                host,
                format!("no prompt within {:?} after the password", budget),
            )),
            WaitOutcome::Closed => Err(unreachable(host, "shell closed during authentication".into())),
        }
    }

    /// A prompt identical to the jump host's means the hop exited without
    /// a recognised error message.
    fn check_left_jump_host(&self, out: &CapturedOutput) -> Result<()> {
        let Some(jump_prompt) = &self.jump_prompt else {
            return Ok(());
        };
        if out.last_line().trim() != jump_prompt.as_str() {
            return Ok(());
        }
        let text = out.as_str_lossy();
        let detail = text
            .lines()
            .rev()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .nth(1)
            .unwrap_or("hop returned to the jump host")
            .to_string();
        Err(unreachable(self.target.target_host(), detail))
    }

    fn learn_prompt(&mut self, out: &CapturedOutput) {
        let Some(prompt) = LearnedPrompt::learn(&out.last_line()) else {
            return;
        };
        if self.device_prompt.as_ref() != Some(&prompt) {
            debug!("[{}] device prompt '{}'", self.target.target_host(), prompt.as_str());
            self.device_prompt = Some(prompt);
        }
    }

    async fn enter_cli<S: ShellIo>(
        &mut self,
        reader: &mut ChannelReader<'_, S>,
        landing: PromptKind,
    ) -> Result<()> {
        let host = self.target.target_host();
        let cli_timeout = self.settings.timeouts.cli;

        match (&self.profile.cli_command, landing) {
            (Some(cli), PromptKind::Shell) => {
                let cli = cli.clone();
                reader.send_line(&cli).await?;
                self.transcript.sent(&cli);

                let mut out = CapturedOutput::new(cli_timeout);
                let outcome = reader
                    .wait_for(&mut out, |o| {
                        trailing_prompt(&o.last_line()).filter(|k| *k != PromptKind::Shell)
                    })
                    .await?;
                match outcome {
                    WaitOutcome::Matched(_) => {
                        self.learn_prompt(&out);
                        self.transcript.note("entered the vendor CLI");
                    }
                    WaitOutcome::TimedOut => self.transcript.warn(format!(
                        "no CLI prompt within {:?} after '{}', continuing",
                        cli_timeout, cli
                    )),
                    WaitOutcome::Closed => {
                        return Err(unreachable(host, "shell closed while entering the CLI".into()));
                    }
                }
            }
            _ => self.transcript.note("already at the device CLI"),
        }
        self.transition(SessionState::CliEntered)?;

        for command in self.profile.on_open_commands.clone() {
            reader.send_line(&command).await?;
            self.transcript.sent(&command);

            let mut out = CapturedOutput::new(cli_timeout);
            let outcome = reader.wait_for(&mut out, |o| trailing_prompt(&o.last_line())).await?;
            match outcome {
                WaitOutcome::Matched(_) => {
                    self.learn_prompt(&out);
                    if let Some(failure) = self.profile.detect_failure(&out.as_str_lossy()) {
                        self.transcript
                            .warn(format!("'{}' rejected by the device: {}", command, failure));
                    }
                }
                WaitOutcome::TimedOut => self.transcript.warn(format!(
                    "no prompt within {:?} after '{}', continuing",
                    cli_timeout, command
                )),
                WaitOutcome::Closed => {
                    return Err(unreachable(host, format!("shell closed after '{}'", command)));
                }
            }
        }
        Ok(())
    }

    async fn dump<S: ShellIo>(&mut self, reader: &mut ChannelReader<'_, S>) -> Result<CapturedConfig> {
        let host = self.target.target_host();
        let command = self.profile.dump_command.clone();
        reader.send_line(&command).await?;
        self.transcript.sent(&command);
        self.transition(SessionState::CommandSent)?;
        self.transition(SessionState::Collecting)?;

        let timeouts = self.settings.timeouts;
        let prompt = self.device_prompt.clone();
        if prompt.is_none() {
            self.transcript
                .warn("device prompt unknown, any prompt-shaped line ends the dump");
        }
        let at_prompt = |o: &CapturedOutput| match &prompt {
            Some(prompt) => prompt.is_at(o),
            None => trailing_prompt(&o.last_line()).is_some(),
        };
        let mut out = CapturedOutput::new(timeouts.collect_deadline);
        let completion = reader
            .collect(
                &mut out,
                timeouts.collect_idle,
                // prompt check first: it is cheap and rarely true mid-dump
                |o| at_prompt(o) && has_payload(&o.as_str_lossy(), &command, prompt.as_ref()),
                |o| has_payload(&o.as_str_lossy(), &command, prompt.as_ref()),
            )
            .await?;

        let bytes = out.bytes_received();
        match completion {
            Completion::Prompt => self
                .transcript
                .note(format!("collected {} bytes, prompt returned", bytes)),
            Completion::Idle => self.transcript.note(format!(
                "collected {} bytes, no new data for {:?}",
                bytes, timeouts.collect_idle
            )),
            Completion::Deadline => self.transcript.warn(format!(
                "collection deadline of {:?} reached after {} bytes, output INCOMPLETE",
                timeouts.collect_deadline, bytes
            )),
            Completion::Closed if out.has_content() => self.transcript.warn(format!(
                "channel closed after {} bytes, output INCOMPLETE",
                bytes
            )),
            Completion::Closed | Completion::Exited => {
                return Err(unreachable(host, "channel closed before any output".into()));
            }
        }

        let raw = out.into_text();
        let validation = self.profile.validator.validate(&raw);
        if !validation.is_accepted() {
            if let Some(failure) = self.profile.detect_failure(&raw) {
                return Err(RelayError::NoValidConfigFound {
                    target: host.to_string(),
                    attempts: 1,
                    last: Some(Box::new(AttemptDiagnostics {
                        command,
                        exit_status: None,
                        stdout: raw,
                        stderr: String::new(),
                        reason: format!("device rejected the command: {}", failure),
                    })),
                }
                .into());
            }
            self.transcript.warn(format!(
                "output does not look like {} configuration ({:?})",
                self.profile.family, validation
            ));
        }

        self.transition(SessionState::Done)?;
        Ok(CapturedConfig {
            target: host.to_string(),
            command,
            family: self.profile.family,
            raw,
            completion,
            bytes,
            validation,
            prompt: self.device_prompt.as_ref().map(|p| p.as_str().to_string()),
            elapsed: self.transcript.elapsed(),
        })
    }

    /// Best-effort `exit` for the device and then the jump shell.
    async fn leave<S: ShellIo>(&mut self, reader: &mut ChannelReader<'_, S>) {
        for _ in 0..2 {
            if reader.send_line("exit").await.is_err() {
                break;
            }
            self.transcript.sent("exit");
            let mut out = CapturedOutput::new(self.settings.timeouts.cli);
            match reader.wait_for(&mut out, |o| trailing_prompt(&o.last_line())).await {
                Ok(WaitOutcome::Matched(_)) => continue,
                _ => break,
            }
        }
    }
}

/// Whether `text` holds at least one non-blank line that is neither the
/// echoed command nor the prompt.
fn has_payload(text: &str, command: &str, prompt: Option<&LearnedPrompt>) -> bool {
    let command = command.trim();
    let is_prompt = |line: &str| match prompt {
        Some(prompt) => prompt.matches(line),
        None => trailing_prompt(line).is_some(),
    };
    text.lines().map(str::trim).any(|line| {
        !line.is_empty() && !line.ends_with(command) && !is_prompt(line) && !is_routing_engine_marker(line)
    })
}

/// Junos `{master:0}` line printed above the prompt.
fn is_routing_engine_marker(line: &str) -> bool {
    line.starts_with('{') && line.ends_with('}') && !line.contains(' ')
}

/// Quote for a POSIX shell unless the word is plainly safe.
pub(crate) fn shell_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if safe {
        word.to_string()
    } else {
        shell_quote(word)
    }
}

/// Single-quote for a POSIX shell.
pub(crate) fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn unreachable(host: &str, detail: String) -> crate::Error {
    RelayError::Unreachable {
        host: host.to_string(),
        detail,
    }
    .into()
}

fn auth_rejected(host: &str, detail: String) -> crate::Error {
    RelayError::AuthRejected {
        host: host.to_string(),
        detail,
    }
    .into()
}
