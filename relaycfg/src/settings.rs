//! Runtime settings.
//!
//! Every field has a default matching the behavior operators expect from
//! the relay tooling; a TOML file only needs to name what it overrides.
//!
//! ```toml
//! [timeouts]
//! collect_deadline = 120
//!
//! [relay]
//! mode = "probe"
//! max_concurrent = 4
//!
//! [parser]
//! management_ip_preference = ["10.20.", "172.16."]
//!
//! [generator]
//! exclude_descriptions = ["interco-orange"]
//! cleanup_vlans = ["VL2_BUREAUTIQUE_Filaire-Wifi", "VL120_BUREAUTIQUE_Filaire-Wifi"]
//! wildcard = true
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::transport::HostKeyVerification;

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeouts: Timeouts,
    pub relay: RelaySettings,
    pub parser: ParserSettings,
    pub radius: RadiusSettings,
    pub generator: GeneratorSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }
}

/// Per-operation time budgets. Values are seconds in TOML (fractions allowed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// TCP connect + SSH handshake + authentication to the jump host.
    #[serde(with = "secs")]
    pub connect: Duration,

    /// Each interactive step (login banner, hop command).
    #[serde(with = "secs")]
    pub step: Duration,

    /// Waiting for the verdict after the target password was sent.
    #[serde(with = "secs")]
    pub auth: Duration,

    /// Entering the vendor CLI and paging commands.
    #[serde(with = "secs")]
    pub cli: Duration,

    /// Absolute deadline for collecting configuration output.
    #[serde(with = "secs")]
    pub collect_deadline: Duration,

    /// Silence after which collected output is considered finished.
    #[serde(with = "secs")]
    pub collect_idle: Duration,

    /// Each exec attempt of the command prober.
    #[serde(with = "secs")]
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            step: Duration::from_secs(15),
            auth: Duration::from_secs(10),
            cli: Duration::from_secs(5),
            collect_deadline: Duration::from_secs(90),
            collect_idle: Duration::from_secs(3),
            probe: Duration::from_secs(90),
        }
    }
}

/// How the configuration is pulled from the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Drive an interactive shell on the jump host and hop with `ssh`.
    #[default]
    Shell,

    /// Exec `sshpass ... ssh` variants on the jump host until one validates.
    Probe,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shell" => Ok(Self::Shell),
            "probe" => Ok(Self::Probe),
            other => Err(format!("unknown retrieval mode '{other}' (expected shell or probe)")),
        }
    }
}

/// Options of the inner `ssh`. The algorithm lists let it negotiate with
/// older EX and Catalyst firmware that only offers CBC ciphers, SHA-1 key
/// exchange and `ssh-rsa`/`ssh-dss` host keys.
pub const DEFAULT_HOP_OPTIONS: &[&str] = &[
    "-tt",
    "-o StrictHostKeyChecking=no",
    "-o UserKnownHostsFile=/dev/null",
    "-o ConnectTimeout=30",
    "-o ServerAliveInterval=10",
    "-o ServerAliveCountMax=3",
    "-o Ciphers=aes128-cbc,3des-cbc,aes192-cbc,aes256-cbc,aes128-ctr,aes192-ctr,aes256-ctr",
    "-o KexAlgorithms=diffie-hellman-group14-sha1,diffie-hellman-group1-sha1,diffie-hellman-group-exchange-sha1,diffie-hellman-group-exchange-sha256",
    "-o HostKeyAlgorithms=ssh-rsa,ssh-dss",
    "-o MACs=hmac-md5,hmac-sha1,hmac-sha2-256",
];

/// Jump-host and hop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// SSH port of the jump host.
    pub port: u16,

    /// Options passed to the `ssh` hop command on the jump host.
    pub hop_options: Vec<String>,

    /// Host key policy for the jump host.
    pub host_key_verification: HostKeyVerification,

    /// known_hosts file used for the jump host (default: ~/.ssh/known_hosts).
    pub known_hosts_path: Option<PathBuf>,

    pub mode: RetrievalMode,

    /// Targets processed at the same time.
    pub max_concurrent: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            port: 22,
            hop_options: DEFAULT_HOP_OPTIONS.iter().map(|o| (*o).to_string()).collect(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            mode: RetrievalMode::default(),
            max_concurrent: 1,
        }
    }
}

/// Configuration parser knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// Interface name prefixes treated as physical switch ports.
    pub port_prefixes: Vec<String>,

    /// Address prefixes preferred for the management IP, best first.
    ///
    /// This is a site heuristic, not a rule: an address matching an earlier
    /// entry wins over one matching a later entry, and any match wins over
    /// an address matching none.
    pub management_ip_preference: Vec<String>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            port_prefixes: vec!["ge-".to_string()],
            management_ip_preference: vec!["10.148.".to_string(), "192.168.".to_string()],
        }
    }
}

/// Which access ports the 802.1X generator covers and how it writes them.
/// The defaults cover every access port, one statement per port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Access ports whose description contains one of these
    /// (case-insensitive) are left untouched, e.g. operator uplinks.
    pub exclude_descriptions: Vec<String>,

    /// When not empty, port-security cleanup is limited to ports whose
    /// first VLAN is listed here.
    pub cleanup_vlans: Vec<String>,

    /// Emit `wildcard range` statements over runs of consecutive ports.
    pub wildcard: bool,
}

/// One RADIUS server definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusServer {
    pub address: String,
    pub port: u16,
    /// Secret as it appears in Junos configuration (usually `$9$...`).
    pub secret: String,
}

/// RADIUS block parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusSettings {
    pub servers: Vec<RadiusServer>,
    pub profile_name: String,

    /// Source address used when no management IP was detected or given.
    pub default_source_address: String,
}

impl Default for RadiusSettings {
    fn default() -> Self {
        Self {
            servers: vec![
                RadiusServer {
                    address: "10.147.32.47".to_string(),
                    port: 1812,
                    secret: "$9$qfTF69tBRcP5Qn9tREdbwsoJUjH.fT".to_string(),
                },
                RadiusServer {
                    address: "10.147.160.47".to_string(),
                    port: 1812,
                    secret: "$9$72Vw2oJUkm5dbs4JUmPBIREreM8XNVw".to_string(),
                },
            ],
            profile_name: "802.1x-auth".to_string(),
            default_source_address: "10.148.62.241".to_string(),
        }
    }
}

/// Serde adapter: `Duration` as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timeouts.connect, Duration::from_secs(30));
        assert_eq!(settings.timeouts.collect_idle, Duration::from_secs(3));
        assert_eq!(settings.relay.port, 22);
        assert_eq!(settings.relay.mode, RetrievalMode::Shell);
        assert_eq!(settings.parser.port_prefixes, vec!["ge-".to_string()]);
        assert_eq!(settings.radius.servers.len(), 2);

        let options = &settings.relay.hop_options;
        assert_eq!(options[0], "-tt");
        assert!(options.contains(&"-o HostKeyAlgorithms=ssh-rsa,ssh-dss".to_string()));
        assert!(options.iter().any(|o| o.starts_with("-o Ciphers=aes128-cbc,3des-cbc")));
        assert!(options.iter().any(|o| o.starts_with("-o KexAlgorithms=diffie-hellman-group14-sha1")));
        assert!(options.iter().any(|o| o.starts_with("-o MACs=hmac-md5")));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [timeouts]
            collect_deadline = 120
            collect_idle = 1.5

            [relay]
            mode = "probe"
            host_key_verification = "disabled"

            [parser]
            management_ip_preference = ["172.16."]

            [generator]
            exclude_descriptions = ["interco-orange"]
            wildcard = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.timeouts.collect_deadline, Duration::from_secs(120));
        assert_eq!(settings.timeouts.collect_idle, Duration::from_millis(1500));
        assert_eq!(settings.timeouts.step, Duration::from_secs(15));
        assert_eq!(settings.relay.mode, RetrievalMode::Probe);
        assert!(matches!(
            settings.relay.host_key_verification,
            HostKeyVerification::Disabled
        ));
        assert_eq!(settings.relay.port, 22);
        assert_eq!(settings.parser.management_ip_preference, vec!["172.16.".to_string()]);
        assert_eq!(settings.parser.port_prefixes, vec!["ge-".to_string()]);
        assert_eq!(settings.generator.exclude_descriptions, vec!["interco-orange".to_string()]);
        assert!(settings.generator.cleanup_vlans.is_empty());
        assert!(settings.generator.wildcard);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Settings::from_toml_str("[relay]\nport = \"ssh\""),
            Err(SettingsError::Parse(_))
        ));
    }
}
