//! Junos `set` statement parser.
//!
//! Extracts the facts the generator needs from sanitized configuration:
//! hostname, management address and the physical ports with their mode.
//! Missing facts are left empty; the parser never fails.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::settings::ParserSettings;

static HOST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^set system host-name\s+(\S+)").expect("static regex"));

static DESCRIPTION_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"description\s+"([^"]+)""#).expect("static regex"));

static DESCRIPTION_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"description\s+(.+)$").expect("static regex"));

static VLAN_MEMBERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vlan members\s+\[?\s*([^\s\]]+)").expect("static regex"));

static INET_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"family inet address\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("static regex")
});

/// Dialect-neutral hostname patterns, tried in order.
static HOSTNAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)^\s*set system host-name\s+(\S+)",
        r"(?im)^\s*set hostname\s+(\S+)",
        r"(?im)^\s*hostname\s+(\S+)",
        r"(?im)^\s*host-name\s+(\S+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

const ACCESS_MARKERS: &[&str] = &["interface-mode access", "port-mode access"];
const TRUNK_MARKERS: &[&str] = &["interface-mode trunk", "port-mode trunk"];

/// Interface name ordered by its numeric slot/port/unit components.
///
/// `ge-0/0/10` sorts after `ge-0/0/9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InterfaceName {
    raw: String,
    #[serde(skip)]
    prefix: String,
    #[serde(skip)]
    numbers: Vec<u32>,
}

impl InterfaceName {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let split = raw.find(|c: char| c.is_ascii_digit()).unwrap_or(raw.len());
        let prefix = raw[..split].to_string();
        let numbers = raw[split..]
            .split(|c: char| !c.is_ascii_digit())
            .filter_map(|n| n.parse().ok())
            .collect();
        Self { raw, prefix, numbers }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for InterfaceName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix
            .cmp(&other.prefix)
            .then_with(|| self.numbers.cmp(&other.numbers))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for InterfaceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// All statements for one physical port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    pub name: InterfaceName,
    pub lines: Vec<String>,
    pub is_access: bool,
    pub description: Option<String>,
    pub vlan: Option<String>,
}

impl InterfaceRecord {
    fn from_lines(name: InterfaceName, lines: Vec<String>) -> Self {
        let has = |markers: &[&str]| {
            lines
                .iter()
                .any(|l| markers.iter().any(|m| l.contains(m)))
        };
        let access = has(ACCESS_MARKERS);
        let trunk = has(TRUNK_MARKERS);
        let vlan_members = lines.iter().any(|l| l.contains("vlan members"));

        // Contradictory markers are treated as non-access.
        let is_access = !trunk && (access || vlan_members);

        let description = lines.iter().find_map(|l| description_of(l));
        let vlan = lines.iter().find_map(|l| {
            VLAN_MEMBERS
                .captures(l)
                .map(|c| c[1].trim_matches('"').to_string())
        });

        Self {
            name,
            lines,
            is_access,
            description,
            vlan,
        }
    }
}

fn description_of(line: &str) -> Option<String> {
    if let Some(caps) = DESCRIPTION_QUOTED.captures(line) {
        return Some(caps[1].to_string());
    }
    DESCRIPTION_BARE
        .captures(line)
        .map(|c| c[1].trim().trim_matches('"').to_string())
        .filter(|d| !d.is_empty())
}

/// Facts parsed from one device configuration. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedDevice {
    hostname: Option<String>,
    management_ip: Option<Ipv4Addr>,
    interfaces: Vec<InterfaceRecord>,
}

impl ParsedDevice {
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn management_ip(&self) -> Option<Ipv4Addr> {
        self.management_ip
    }

    /// Every physical port, in numeric order.
    pub fn interfaces(&self) -> &[InterfaceRecord] {
        &self.interfaces
    }

    /// Access ports only, in numeric order.
    pub fn access_interfaces(&self) -> impl Iterator<Item = &InterfaceRecord> {
        self.interfaces.iter().filter(|i| i.is_access)
    }

    pub fn access_count(&self) -> usize {
        self.access_interfaces().count()
    }
}

/// Management address candidate: lower rank is better.
struct Candidate {
    rank: usize,
    address: Ipv4Addr,
}

/// Parser for Junos `set` configuration.
#[derive(Debug, Clone)]
pub struct ConfigParser {
    port_prefixes: Vec<String>,
    preference: Vec<String>,
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::new(&ParserSettings::default())
    }
}

impl ConfigParser {
    pub fn new(settings: &ParserSettings) -> Self {
        Self {
            port_prefixes: settings.port_prefixes.clone(),
            preference: settings.management_ip_preference.clone(),
        }
    }

    pub fn parse(&self, text: &str) -> ParsedDevice {
        let mut hostname = None;
        let mut management: Option<Candidate> = None;
        let mut ports: BTreeMap<InterfaceName, Vec<String>> = BTreeMap::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if hostname.is_none() {
                if let Some(caps) = HOST_NAME.captures(line) {
                    hostname = Some(strip_token(&caps[1]));
                }
            }

            let Some(name) = line.strip_prefix("set interfaces ").and_then(|r| r.split_whitespace().next())
            else {
                continue;
            };

            if let Some(candidate) = self.address_candidate(name, line) {
                if management.as_ref().is_none_or(|m| candidate.rank < m.rank) {
                    management = Some(candidate);
                }
            }

            if self.is_port(name) {
                ports
                    .entry(InterfaceName::new(name))
                    .or_default()
                    .push(line.to_string());
            }
        }

        let interfaces = ports
            .into_iter()
            .map(|(name, lines)| InterfaceRecord::from_lines(name, lines))
            .collect();

        ParsedDevice {
            hostname,
            management_ip: management.map(|m| m.address),
            interfaces,
        }
    }

    fn is_port(&self, name: &str) -> bool {
        self.port_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Rank of an address in the preference list; unpreferred ranks last.
    fn rank(&self, address: &Ipv4Addr) -> usize {
        let text = address.to_string();
        self.preference
            .iter()
            .position(|p| text.starts_with(p.as_str()))
            .unwrap_or(self.preference.len())
    }

    /// Unit 0 addresses on any interface are candidates; VLAN interface
    /// addresses on other units only when they fall in a preferred range.
    fn address_candidate(&self, name: &str, line: &str) -> Option<Candidate> {
        let address: Ipv4Addr = INET_ADDRESS.captures(line)?[1].parse().ok()?;
        let rank = self.rank(&address);
        let unit_zero = line.contains("unit 0 family inet address");
        let vlan_interface = name == "vlan" || name == "irb" || name.starts_with("vlan.");

        if unit_zero || (vlan_interface && rank < self.preference.len()) {
            Some(Candidate { rank, address })
        } else {
            None
        }
    }
}

/// Display hostname from any supported dialect, for naming saved files.
pub fn detect_hostname(text: &str) -> Option<String> {
    HOSTNAME_PATTERNS.iter().find_map(|re| {
        re.captures(text)
            .map(|c| strip_token(&c[1]))
            .filter(|h| !h.is_empty())
    })
}

fn strip_token(token: &str) -> String {
    token.trim_matches(|c| c == '"' || c == '\'' || c == ';').to_string()
}
