//! Prompt and error classification of captured shell output.
//!
//! There is no framing on an interactive shell: the only way to know that
//! a step finished is to recognise what the remote side printed last.

use std::sync::LazyLock;

use regex::Regex;

use super::buffer::CapturedOutput;

/// Phrases meaning the network path failed (checked case-insensitively).
pub const UNREACHABLE_PHRASES: &[&str] = &[
    "connection refused",
    "no route to host",
    "could not resolve hostname",
    "name or service not known",
    "network is unreachable",
    "host unreachable",
    "connection timed out",
    "connection closed by",
];

/// Phrases meaning credentials were refused (checked case-insensitively).
pub const AUTH_FAILURE_PHRASES: &[&str] = &[
    "permission denied",
    "authentication failure",
    "authentication failed",
    "invalid password",
    "access denied",
    "login incorrect",
    "login failed",
    "invalid user",
    "user unknown",
];

static PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.@:/()\[\]{}~ ]{0,80}[>#$%]\s*$").expect("static regex"));

static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)pass(word|code)[^\n:]{0,40}:\s*$").expect("static regex"));

static HOST_KEY_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(yes/no(/\[fingerprint\])?\)\?\s*$").expect("static regex")
});

/// Prompt character observed at the end of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// `>` - vendor operational CLI.
    Operational,
    /// `#` - privileged CLI or root shell.
    Privileged,
    /// `$` or `%` - unprivileged Unix shell.
    Shell,
}

impl PromptKind {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '>' => Some(Self::Operational),
            '#' => Some(Self::Privileged),
            '$' | '%' => Some(Self::Shell),
            _ => None,
        }
    }
}

/// What the captured output says about the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A network-level failure phrase.
    Unreachable(String),
    /// An authentication failure phrase.
    AuthRejected(String),
    /// The remote side waits for a password.
    PasswordPrompt,
    /// OpenSSH asks to confirm an unknown host key.
    HostKeyQuestion,
    /// A trailing shell/CLI prompt: ready for the next command.
    Prompt(PromptKind),
}

/// Classifier over the tail of captured output.
///
/// Failure phrases take precedence over prompts because a failed hop
/// usually ends with the jump host's own prompt.
#[derive(Debug, Clone)]
pub struct Classifier {
    unreachable: Vec<String>,
    auth_failures: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            unreachable: UNREACHABLE_PHRASES.iter().map(|p| (*p).to_string()).collect(),
            auth_failures: AUTH_FAILURE_PHRASES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

impl Classifier {
    /// Create a classifier with the built-in phrase lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add vendor-specific authentication failure phrases.
    pub fn with_auth_failures<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_failures
            .extend(phrases.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    /// Classify the captured output, most severe finding first.
    pub fn classify(&self, output: &CapturedOutput) -> Option<Verdict> {
        let tail = output.tail();
        let lowered = tail.to_lowercase();

        if let Some(phrase) = find_phrase(&lowered, &self.unreachable) {
            return Some(Verdict::Unreachable(phrase.to_string()));
        }
        if let Some(phrase) = find_phrase(&lowered, &self.auth_failures) {
            return Some(Verdict::AuthRejected(phrase.to_string()));
        }

        let last_line = output.last_line();
        if PASSWORD_PROMPT.is_match(&last_line) {
            return Some(Verdict::PasswordPrompt);
        }
        if HOST_KEY_QUESTION.is_match(&last_line) {
            return Some(Verdict::HostKeyQuestion);
        }
        trailing_prompt(&last_line).map(Verdict::Prompt)
    }

    /// Only the failure half of [`classify`](Self::classify).
    pub fn failure(&self, text: &str) -> Option<Verdict> {
        let lowered = text.to_lowercase();
        if let Some(phrase) = find_phrase(&lowered, &self.unreachable) {
            return Some(Verdict::Unreachable(phrase.to_string()));
        }
        find_phrase(&lowered, &self.auth_failures).map(|p| Verdict::AuthRejected(p.to_string()))
    }
}

/// Recognise a prompt on a single line.
///
/// Configuration statements never count as prompts even if they happen to
/// end with a prompt character.
pub fn trailing_prompt(line: &str) -> Option<PromptKind> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("set ") || trimmed.starts_with("delete ") {
        return None;
    }
    if !PROMPT.is_match(line) {
        return None;
    }
    line.trim_end().chars().last().and_then(PromptKind::from_char)
}

/// The device's own prompt line, learned once the session reached the CLI.
///
/// Configuration text can end a chunk with a prompt-shaped line
/// (` description Uplink 100%`, `banner motd #`), so after login only an
/// exact match of this line counts as the end of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedPrompt {
    line: String,
    kind: PromptKind,
}

impl LearnedPrompt {
    /// Learn from the last line of output, if it is a prompt.
    pub fn learn(line: &str) -> Option<Self> {
        let line = line.trim();
        trailing_prompt(line).map(|kind| Self {
            line: line.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    /// Whether `line` is exactly this prompt.
    pub fn matches(&self, line: &str) -> bool {
        line.trim() == self.line
    }

    /// Whether the output currently ends at this prompt.
    pub fn is_at(&self, output: &CapturedOutput) -> bool {
        self.matches(&output.last_line())
    }
}

fn find_phrase<'a>(haystack: &str, phrases: &'a [String]) -> Option<&'a str> {
    phrases
        .iter()
        .find(|p| haystack.contains(p.as_str()))
        .map(String::as_str)
}
