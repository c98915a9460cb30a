//! Vendor family and profile definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::validator::ContentValidator;

/// Dialect of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorFamily {
    /// Juniper Junos (EX/QFX switches).
    Juniper,
    /// Cisco IOS and Aruba, both `running-config` style.
    Cisco,
}

impl VendorFamily {
    /// All families in catalog order.
    pub const ALL: [VendorFamily; 2] = [VendorFamily::Juniper, VendorFamily::Cisco];

    pub fn name(self) -> &'static str {
        match self {
            Self::Juniper => "juniper",
            Self::Cisco => "cisco",
        }
    }
}

impl fmt::Display for VendorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VendorFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "juniper" | "junos" => Ok(Self::Juniper),
            "cisco" | "ios" | "aruba" => Ok(Self::Cisco),
            other => Err(format!("unknown vendor '{other}' (expected juniper or cisco)")),
        }
    }
}

/// Everything the relay needs to know about one vendor family.
#[derive(Debug, Clone)]
pub struct VendorProfile {
    pub family: VendorFamily,

    /// Command that enters the vendor CLI when the login lands in a Unix
    /// shell (`%` or `$` prompt).
    pub cli_command: Option<String>,

    /// Commands sent once the CLI is reached, before the dump.
    pub on_open_commands: Vec<String>,

    /// Configuration dump command used by the shell automaton.
    pub dump_command: String,

    /// Line prefixes meaning the device rejected a command.
    pub failed_when_contains: Vec<String>,

    /// Vendor-specific authentication failure phrases.
    pub auth_failures: Vec<String>,

    /// Structural check for configuration output of this family.
    pub validator: ContentValidator,
}

impl VendorProfile {
    /// Create a profile with only the dump command and validator set.
    pub fn new(
        family: VendorFamily,
        dump_command: impl Into<String>,
        validator: ContentValidator,
    ) -> Self {
        Self {
            family,
            cli_command: None,
            on_open_commands: vec![],
            dump_command: dump_command.into(),
            failed_when_contains: vec![],
            auth_failures: vec![],
            validator,
        }
    }

    /// Set the CLI entry command.
    pub fn with_cli_command(mut self, command: impl Into<String>) -> Self {
        self.cli_command = Some(command.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into().to_lowercase());
        self
    }

    /// Add an authentication failure phrase.
    pub fn with_auth_failure(mut self, phrase: impl Into<String>) -> Self {
        self.auth_failures.push(phrase.into());
        self
    }

    /// Detect a command failure: a line starting with one of the failure
    /// patterns. Configuration statements never start with them.
    pub fn detect_failure(&self, output: &str) -> Option<String> {
        output.lines().find_map(|line| {
            let lowered = line.trim().to_lowercase();
            self.failed_when_contains
                .iter()
                .any(|p| lowered.starts_with(p.as_str()))
                .then(|| line.trim().to_string())
        })
    }

    /// Profile for the given family.
    pub fn for_family(family: VendorFamily) -> Self {
        match family {
            VendorFamily::Juniper => super::vendors::juniper::profile(),
            VendorFamily::Cisco => super::vendors::cisco::profile(),
        }
    }
}
