//! Saved configuration files and caller-facing markers.
//!
//! One file per retrieved device, `<hostname>.txt` or
//! `switch_<ip_with_underscores>.txt`, starting with a comment header.
//! Generated 802.1X documents go next to it as `<hostname>_ISE_config.txt`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::info;

use crate::device::GeneratedConfig;
use crate::error::Result;
use crate::retrieve::TargetOutcome;

pub const SAVED_MARKER: &str = "CONFIG_SAVED:";
pub const ERROR_MARKER: &str = "CONFIG_ERROR:";
pub const INCOMPLETE_WARNING: &str = "# WARNING: INCOMPLETE";

const HEADER_RULE_WIDTH: usize = 50;

/// `CONFIG_SAVED:<path>`
pub fn saved_marker(path: &Path) -> String {
    format!("{SAVED_MARKER}{}", path.display())
}

/// `CONFIG_ERROR:<address> - <reason>`
pub fn error_marker(target: &str, reason: &str) -> String {
    format!("{ERROR_MARKER}{target} - {reason}")
}

/// File stem for a device: its hostname made path-safe, or
/// `switch_<ip>` when the hostname is missing or just the address.
pub fn file_stem(hostname: Option<&str>, target: &str) -> String {
    let safe = hostname
        .filter(|h| *h != target)
        .map(|h| {
            h.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
                .trim_matches('.')
                .to_string()
        })
        .filter(|h| !h.is_empty());

    safe.unwrap_or_else(|| {
        let address: String = target
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("switch_{address}")
    })
}

/// Comment header written above a saved configuration.
pub fn render_header(outcome: &TargetOutcome, relay_identity: &str, retrieved_at: NaiveDateTime) -> String {
    let mut lines = vec![
        format!("# Configuration retrieved on {}", retrieved_at.format("%Y-%m-%d %H:%M:%S")),
        format!("# Switch IP: {}", outcome.target),
        format!(
            "# Hostname: {}",
            outcome.hostname.as_deref().unwrap_or("(not detected)")
        ),
    ];
    if let Some(captured) = &outcome.captured {
        lines.push(format!("# Command: {}", captured.command));
    }
    lines.push(format!("# Retrieved via relay {relay_identity}"));
    if let Some(captured) = outcome.captured.as_ref().filter(|c| c.is_incomplete()) {
        lines.push(format!(
            "{INCOMPLETE_WARNING} (collection ended: {:?}, {} bytes received)",
            captured.completion, captured.bytes
        ));
    }
    lines.push(format!("#{}", "=".repeat(HEADER_RULE_WIDTH)));
    lines.push(String::new());
    lines.join("\n") + "\n"
}

/// Writes retrieved and generated configuration into one directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a successful outcome. Returns `Ok(None)` for failed targets.
    pub fn save(
        &self,
        outcome: &TargetOutcome,
        relay_identity: &str,
        retrieved_at: NaiveDateTime,
    ) -> Result<Option<PathBuf>> {
        let Some(config) = &outcome.config else {
            return Ok(None);
        };
        let stem = file_stem(outcome.hostname.as_deref(), &outcome.target);
        let path = self.dir.join(format!("{stem}.txt"));

        let mut text = render_header(outcome, relay_identity, retrieved_at);
        text.push_str(config);
        text.push('\n');
        self.write(&path, &text)?;
        Ok(Some(path))
    }

    /// Save a generated 802.1X document as `<stem>_ISE_config.txt`.
    pub fn save_generated(
        &self,
        generated: &GeneratedConfig,
        stem: &str,
        generated_at: NaiveDateTime,
    ) -> Result<PathBuf> {
        let path = self.dir.join(format!("{stem}_ISE_config.txt"));
        self.write(&path, &generated.render_document(generated_at))?;
        Ok(path)
    }

    fn write(&self, path: &Path, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, text)?;
        info!("wrote {} ({} bytes)", path.display(), text.len());
        Ok(())
    }
}
