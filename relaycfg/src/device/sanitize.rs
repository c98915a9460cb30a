//! Removal of shell noise from captured output.
//!
//! Login banners, paging notices and prompts are only stripped from the
//! head and the tail of the output. Inside the configuration the only
//! lines dropped are session lines: the learned device prompt and commands
//! echoed after a prompt. A configuration line is never edited or dropped
//! for its content, so ProCurve `exit` lines and `name Uplink-100%`
//! survive.

use std::sync::LazyLock;

use regex::Regex;

use crate::channel::trailing_prompt;

/// Line prefixes of banners and notices (compared case-insensitively).
pub const NOISE_PREFIXES: &[&str] = &[
    "last login:",
    "welcome to",
    "warning:",
    "connection to ",
    "authenticated to",
    "--- junos ",
    "building configuration",
    "current configuration :",
    "running configuration:",
    "screen length set to",
];

/// Session commands that show up echoed after a prompt.
const SESSION_COMMANDS: &[&str] = &["exit", "cli", "set cli screen-length 0", "terminal length 0"];

/// `user@host> command` or `switch#command`: an echoed command after a prompt.
static PROMPT_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.@:()\[\]~]{1,80}[>#$%]\s*(\S.*)$").expect("static regex"));

/// Junos routing-engine marker printed above prompts.
static RE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\w+(:\w*\d)?\}$").expect("static regex"));

/// Line-based output sanitizer.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    echoes: Vec<String>,
    prompt: Option<String>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also drop lines that are the echo of `command`.
    pub fn with_echo(mut self, command: impl Into<String>) -> Self {
        let command = command.into().trim().to_string();
        if !command.is_empty() {
            self.echoes.push(command);
        }
        self
    }

    /// The device prompt seen during the session.
    pub fn with_prompt(mut self, prompt: Option<&str>) -> Self {
        self.prompt = prompt.map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    /// Whether the line is a prompt, an echoed command or a session
    /// command typed at a prompt. Dropped wherever it appears.
    pub fn is_session_line(&self, line: &str) -> bool {
        let line = line.trim_end();
        if line.is_empty() {
            return false;
        }
        if self.echoes.iter().any(|e| e.as_str() == line.trim_start()) {
            return true;
        }
        let is_command = |cmd: &str| {
            let cmd = cmd.trim();
            SESSION_COMMANDS.contains(&cmd) || self.echoes.iter().any(|e| e.as_str() == cmd)
        };
        if let Some(prompt) = &self.prompt {
            if let Some(rest) = line.strip_prefix(prompt.as_str()) {
                return rest.trim().is_empty() || is_command(rest);
            }
        }
        PROMPT_ECHO
            .captures(line)
            .and_then(|c| c.get(1))
            .is_some_and(|cmd| is_command(cmd.as_str()))
    }

    /// Whether the line is noise when it sits before or after the
    /// configuration: banners, password prompts, any prompt.
    pub fn is_noise(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.is_session_line(line) {
            return true;
        }
        let lowered = trimmed.to_lowercase();
        if NOISE_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return true;
        }
        if lowered.contains("'s password:") || lowered == "password:" {
            return true;
        }
        if RE_MARKER.is_match(trimmed) || (trimmed.starts_with("[edit") && trimmed.ends_with(']')) {
            return true;
        }
        // indented lines are configuration context, never a prompt
        !line.starts_with(char::is_whitespace) && trailing_prompt(trimmed).is_some()
    }

    /// Strip noise from both ends, session lines everywhere, normalise
    /// line endings. Interior blank lines are kept.
    pub fn sanitize(&self, raw: &str) -> String {
        let lines: Vec<&str> = raw.split('\n').map(|l| l.trim_end_matches('\r')).collect();
        let edge = |l: &&str| l.trim().is_empty() || self.is_noise(l);

        let Some(first) = lines.iter().position(|l| !edge(l)) else {
            return String::new();
        };
        let last = lines.iter().rposition(|l| !edge(l)).unwrap_or(first);

        lines[first..=last]
            .iter()
            .filter(|l| !self.is_session_line(l))
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}
