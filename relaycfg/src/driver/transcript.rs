//! Operator-facing diagnostic transcript of one retrieval.
//!
//! Every entry is mirrored to the `log` facade with the target address as
//! prefix, so `RUST_LOG=relaycfg=debug` shows the same story live.

use std::fmt;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use serde::Serialize;

/// Text written in place of any secret that was sent.
pub const HIDDEN_INPUT: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    /// Milliseconds since the retrieval started.
    pub elapsed_ms: u64,
    pub level: EntryLevel,
    pub message: String,
}

/// Ordered, timestamped log lines for one target.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    label: String,
    #[serde(skip)]
    started: Instant,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, level: EntryLevel, message: String) {
        match level {
            EntryLevel::Info => info!("[{}] {}", self.label, message),
            EntryLevel::Warn => warn!("[{}] {}", self.label, message),
            EntryLevel::Error => error!("[{}] {}", self.label, message),
        }
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.entries.push(TranscriptEntry {
            elapsed_ms,
            level,
            message,
        });
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.push(EntryLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(EntryLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(EntryLevel::Error, message.into());
    }

    /// Record a command sent on the shell.
    pub fn sent(&mut self, command: &str) {
        self.push(EntryLevel::Info, format!(">>> {command}"));
    }

    /// Record that a secret was sent without revealing it.
    pub fn sent_hidden(&mut self) {
        self.push(EntryLevel::Info, format!(">>> {HIDDEN_INPUT}"));
    }

    /// Append another transcript's entries (already logged once).
    pub fn extend(&mut self, other: Transcript) {
        self.entries.extend(other.entries);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let marker = match entry.level {
                EntryLevel::Info => "",
                EntryLevel::Warn => "WARNING: ",
                EntryLevel::Error => "ERROR: ",
            };
            writeln!(
                f,
                "[{:>4}.{:03}s] {}{}",
                entry.elapsed_ms / 1000,
                entry.elapsed_ms % 1000,
                marker,
                entry.message
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_input_never_shows_secret() {
        let mut transcript = Transcript::new("10.0.0.9");
        transcript.sent("ssh admin@10.0.0.9");
        transcript.sent_hidden();
        let rendered = transcript.to_string();
        assert!(rendered.contains(">>> ssh admin@10.0.0.9"));
        assert!(rendered.contains(">>> ********"));
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn test_levels_render() {
        let mut transcript = Transcript::new("sw");
        transcript.warn("output incomplete");
        transcript.error("unreachable");
        let rendered = transcript.to_string();
        assert!(rendered.contains("WARNING: output incomplete"));
        assert!(rendered.contains("ERROR: unreachable"));
    }
}
