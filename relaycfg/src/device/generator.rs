//! 802.1X / RADIUS configuration generation.
//!
//! Output depends only on the access interfaces of a [`ParsedDevice`], the
//! RADIUS and generator settings and the source address, so the same input
//! always renders to the same bytes.

use std::net::Ipv4Addr;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::parser::{InterfaceRecord, ParsedDevice};
use crate::settings::{GeneratorSettings, RadiusSettings};

/// Authenticator statements emitted per access interface.
pub const DOT1X_STATEMENTS: &[&str] = &[
    "supplicant multiple",
    "retries 3",
    "transmit-period 1",
    "reauthentication 3600",
    "supplicant-timeout 10",
    "maximum-requests 3",
    "mac-radius",
];

/// Legacy port-security statements removed per access interface.
///
/// `mac-limit action` deletes the action node whatever its configured value.
pub const CLEANUP_STATEMENTS: &[&str] = &["mac-limit 3", "mac-limit action"];

const DOT1X_HEAD: &str = "set protocols dot1x authenticator interface";
const CLEANUP_HEAD: &str = "delete ethernet-switching-options secure-access-port interface";
const WILDCARD: &str = "wildcard range";

const RULE_WIDTH: usize = 60;

/// The three generated blocks. Empty when the device has no access port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedConfig {
    pub dot1x: String,
    pub radius: String,
    pub cleanup: String,
    pub source_address: String,

    /// Access ports covered by the dot1x block.
    pub interfaces: Vec<String>,

    /// Access ports covered by the cleanup block.
    pub cleanup_interfaces: Vec<String>,

    /// Access ports left out by description.
    pub excluded: Vec<String>,

    pub hostname: Option<String>,
    #[serde(skip)]
    servers: Vec<String>,
    #[serde(skip)]
    profile: String,
}

/// Renders [`GeneratedConfig`] from parsed devices.
#[derive(Debug, Clone)]
pub struct ConfigGenerator<'a> {
    radius: &'a RadiusSettings,
    options: GeneratorSettings,
}

impl<'a> ConfigGenerator<'a> {
    pub fn new(radius: &'a RadiusSettings) -> Self {
        Self {
            radius,
            options: GeneratorSettings::default(),
        }
    }

    /// Port selection and wildcard rendering.
    pub fn with_options(mut self, options: &GeneratorSettings) -> Self {
        self.options = options.clone();
        self
    }

    /// Generate the blocks. `source` overrides the RADIUS source address;
    /// without it the configured default is used.
    pub fn generate(&self, device: &ParsedDevice, source: Option<Ipv4Addr>) -> GeneratedConfig {
        let source_address = source
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| self.radius.default_source_address.clone());

        let (covered, excluded): (Vec<&InterfaceRecord>, Vec<&InterfaceRecord>) =
            device.access_interfaces().partition(|i| !self.is_excluded(i));
        let interfaces = names(covered.iter().copied());
        let cleanup_interfaces = names(covered.iter().copied().filter(|i| self.needs_cleanup(i)));

        let (dot1x, cleanup) = if self.options.wildcard {
            (
                statements(&format!("{WILDCARD} {DOT1X_HEAD}"), &port_ranges(&interfaces), DOT1X_STATEMENTS),
                statements(
                    &format!("{WILDCARD} {CLEANUP_HEAD}"),
                    &port_ranges(&cleanup_interfaces),
                    CLEANUP_STATEMENTS,
                ),
            )
        } else {
            (
                statements(DOT1X_HEAD, &interfaces, DOT1X_STATEMENTS),
                statements(CLEANUP_HEAD, &cleanup_interfaces, CLEANUP_STATEMENTS),
            )
        };

        GeneratedConfig {
            dot1x,
            radius: self.radius_block(&source_address),
            cleanup,
            source_address,
            interfaces,
            cleanup_interfaces,
            excluded: names(excluded.into_iter()),
            hostname: device.hostname().map(str::to_string),
            servers: self.radius.servers.iter().map(|s| s.address.clone()).collect(),
            profile: self.radius.profile_name.clone(),
        }
    }

    fn is_excluded(&self, iface: &InterfaceRecord) -> bool {
        let Some(description) = &iface.description else {
            return false;
        };
        let description = description.to_lowercase();
        self.options
            .exclude_descriptions
            .iter()
            .any(|p| description.contains(&p.to_lowercase()))
    }

    fn needs_cleanup(&self, iface: &InterfaceRecord) -> bool {
        let vlans = &self.options.cleanup_vlans;
        vlans.is_empty() || iface.vlan.as_ref().is_some_and(|v| vlans.contains(v))
    }

    fn radius_block(&self, source: &str) -> String {
        let profile = &self.radius.profile_name;
        let mut out = Vec::new();

        for server in &self.radius.servers {
            let prefix = format!("set access radius-server {}", server.address);
            out.push(format!("{prefix} port {}", server.port));
            out.push(format!("{prefix} secret \"{}\"", server.secret));
            out.push(format!("{prefix} source-address {source}"));
        }

        let prefix = format!("set access profile {profile}");
        out.push(format!("{prefix} accounting-order radius"));
        out.push(format!("{prefix} authentication-order radius"));
        for server in &self.radius.servers {
            out.push(format!("{prefix} radius authentication-server {}", server.address));
        }
        for server in &self.radius.servers {
            out.push(format!("{prefix} radius accounting-server {}", server.address));
        }
        out.push(format!("set protocols dot1x authenticator authentication-profile-name {profile}"));

        out.join("\n")
    }
}

impl GeneratedConfig {
    /// Number of statements in the dot1x block.
    pub fn dot1x_statements(&self) -> usize {
        self.dot1x.lines().count()
    }

    pub fn cleanup_statements(&self) -> usize {
        self.cleanup.lines().count()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Complete change document. The three blocks appear verbatim.
    pub fn render_document(&self, generated_at: NaiveDateTime) -> String {
        let mut lines = vec![
            "# ISE 802.1X configuration".to_string(),
            format!("# Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        ];
        if let Some(hostname) = &self.hostname {
            lines.push(format!("# Switch: {hostname}"));
        }
        lines.push(format!("# Access interfaces: {}", self.interfaces.len()));
        lines.push(format!("#{}", "=".repeat(RULE_WIDTH)));
        lines.push(String::new());

        for (title, block) in [
            ("RADIUS CONFIGURATION", &self.radius),
            ("DOT1X PER-INTERFACE CONFIGURATION", &self.dot1x),
            ("SECURE-ACCESS-PORT REMOVAL", &self.cleanup),
        ] {
            lines.push(format!("# ===== {title} ====="));
            if !block.is_empty() {
                lines.push(block.clone());
            }
            lines.push(String::new());
        }

        lines.push("# ===== SUMMARY =====".to_string());
        lines.push(format!("# RADIUS servers: {}", self.servers.join(", ")));
        lines.push(format!("# Access profile: {}", self.profile));
        lines.push(format!("# RADIUS source address: {}", self.source_address));
        lines.push(format!("# Interfaces configured: {}", self.interfaces.len()));
        if !self.interfaces.is_empty() {
            lines.push(format!("# Interfaces: {}", self.interfaces.join(", ")));
        }
        if self.cleanup_interfaces != self.interfaces {
            lines.push(format!("# Cleanup interfaces: {}", self.cleanup_interfaces.join(", ")));
        }
        if !self.excluded.is_empty() {
            lines.push(format!("# Excluded interfaces: {}", self.excluded.join(", ")));
        }
        lines.join("\n") + "\n"
    }
}

/// `ge-0/0/[1-4]` patterns covering runs of consecutive ports, in order.
/// A name without a numeric last component is passed through.
pub fn port_ranges(names: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut run: Option<(&str, u32, u32)> = None;

    for name in names {
        let parsed = name
            .rfind('/')
            .and_then(|i| Some((&name[..=i], name[i + 1..].parse::<u32>().ok()?)));
        let Some((stem, port)) = parsed else {
            flush_run(&mut out, run.take());
            out.push(name.clone());
            continue;
        };
        if let Some((current, _, end)) = run.as_mut() {
            if *current == stem && end.checked_add(1) == Some(port) {
                *end = port;
                continue;
            }
        }
        flush_run(&mut out, run.replace((stem, port, port)));
    }
    flush_run(&mut out, run);
    out
}

fn flush_run(out: &mut Vec<String>, run: Option<(&str, u32, u32)>) {
    match run {
        Some((stem, start, end)) if start == end => out.push(format!("{stem}[{start}]")),
        Some((stem, start, end)) => out.push(format!("{stem}[{start}-{end}]")),
        None => {}
    }
}

fn statements(head: &str, targets: &[String], leaves: &[&str]) -> String {
    targets
        .iter()
        .flat_map(|t| leaves.iter().map(move |leaf| format!("{head} {t} {leaf}")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn names<'r>(records: impl Iterator<Item = &'r InterfaceRecord>) -> Vec<String> {
    records.map(|i| i.name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::device::ConfigParser;

    const SAMPLE: &str = "\
set system host-name myswitch
set interfaces ge-0/0/5 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/5 unit 0 family ethernet-switching vlan members DATA
set interfaces ge-0/0/6 unit 0 family ethernet-switching interface-mode trunk
set interfaces vlan unit 160 family inet address 10.148.62.10/24";

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap()
    }

    #[test]
    fn test_single_access_port() {
        let radius = RadiusSettings::default();
        let device = ConfigParser::default().parse(SAMPLE);
        let generated = ConfigGenerator::new(&radius).generate(&device, device.management_ip());

        assert_eq!(device.hostname(), Some("myswitch"));
        assert_eq!(generated.interfaces, vec!["ge-0/0/5".to_string()]);
        assert_eq!(generated.dot1x_statements(), 7);
        assert_eq!(generated.cleanup_statements(), 2);
        assert!(generated
            .dot1x
            .lines()
            .all(|l| l.starts_with("set protocols dot1x authenticator interface ge-0/0/5 ")));
        assert_eq!(
            generated.cleanup,
            "delete ethernet-switching-options secure-access-port interface ge-0/0/5 mac-limit 3\n\
             delete ethernet-switching-options secure-access-port interface ge-0/0/5 mac-limit action"
        );
        assert_eq!(generated.source_address, "10.148.62.10");
        assert!(generated
            .radius
            .contains("set access radius-server 10.147.32.47 source-address 10.148.62.10"));
    }

    const FLOOR: &str = "\
set interfaces ge-0/0/1 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/1 unit 0 family ethernet-switching vlan members VL2_BUREAUTIQUE_Filaire-Wifi
set interfaces ge-0/0/2 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/2 unit 0 family ethernet-switching vlan members VL2_BUREAUTIQUE_Filaire-Wifi
set interfaces ge-0/0/3 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/3 unit 0 family ethernet-switching vlan members VL120_BUREAUTIQUE_Filaire-Wifi
set interfaces ge-0/0/4 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/4 unit 0 family ethernet-switching vlan members VL30_VOIP
set interfaces ge-0/0/7 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/0/7 unit 0 family ethernet-switching vlan members VL2_BUREAUTIQUE_Filaire-Wifi
set interfaces ge-0/0/47 description \"INTERCO-ORANGE lien 2\"
set interfaces ge-0/0/47 unit 0 family ethernet-switching interface-mode access
set interfaces ge-0/1/0 unit 0 family ethernet-switching interface-mode access";

    fn floor_options() -> GeneratorSettings {
        GeneratorSettings {
            exclude_descriptions: vec!["interco-orange".into()],
            cleanup_vlans: vec![
                "VL2_BUREAUTIQUE_Filaire-Wifi".into(),
                "VL120_BUREAUTIQUE_Filaire-Wifi".into(),
            ],
            wildcard: false,
        }
    }

    #[test]
    fn test_exclusion_and_cleanup_vlans() {
        let radius = RadiusSettings::default();
        let device = ConfigParser::default().parse(FLOOR);
        let generated = ConfigGenerator::new(&radius)
            .with_options(&floor_options())
            .generate(&device, None);

        assert_eq!(
            generated.interfaces,
            ["ge-0/0/1", "ge-0/0/2", "ge-0/0/3", "ge-0/0/4", "ge-0/0/7", "ge-0/1/0"]
        );
        assert_eq!(generated.excluded, ["ge-0/0/47"]);
        assert_eq!(generated.cleanup_interfaces, ["ge-0/0/1", "ge-0/0/2", "ge-0/0/3", "ge-0/0/7"]);
        assert_eq!(generated.dot1x_statements(), 6 * 7);
        assert_eq!(generated.cleanup_statements(), 4 * 2);
        assert!(!generated.dot1x.contains("ge-0/0/47"));

        let doc = generated.render_document(timestamp());
        assert!(doc.contains("# Excluded interfaces: ge-0/0/47\n"));
        assert!(doc.contains("# Cleanup interfaces: ge-0/0/1, ge-0/0/2, ge-0/0/3, ge-0/0/7\n"));
    }

    #[test]
    fn test_wildcard_ranges() {
        let radius = RadiusSettings::default();
        let device = ConfigParser::default().parse(FLOOR);
        let options = GeneratorSettings {
            wildcard: true,
            ..floor_options()
        };
        let generated = ConfigGenerator::new(&radius).with_options(&options).generate(&device, None);

        let dot1x: Vec<&str> = generated.dot1x.lines().collect();
        assert_eq!(dot1x.len(), 3 * 7);
        assert_eq!(
            dot1x[0],
            "wildcard range set protocols dot1x authenticator interface ge-0/0/[1-4] supplicant multiple"
        );
        assert_eq!(
            dot1x[7],
            "wildcard range set protocols dot1x authenticator interface ge-0/0/[7] supplicant multiple"
        );
        assert_eq!(
            dot1x[20],
            "wildcard range set protocols dot1x authenticator interface ge-0/1/[0] mac-radius"
        );
        assert_eq!(
            generated.cleanup,
            "wildcard range delete ethernet-switching-options secure-access-port interface ge-0/0/[1-3] mac-limit 3\n\
             wildcard range delete ethernet-switching-options secure-access-port interface ge-0/0/[1-3] mac-limit action\n\
             wildcard range delete ethernet-switching-options secure-access-port interface ge-0/0/[7] mac-limit 3\n\
             wildcard range delete ethernet-switching-options secure-access-port interface ge-0/0/[7] mac-limit action"
        );
    }

    #[test]
    fn test_port_ranges() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            port_ranges(&names(&["ge-0/0/0", "ge-0/0/1", "ge-0/0/2", "ge-0/0/10", "ge-1/0/10", "ge-1/0/11"])),
            ["ge-0/0/[0-2]", "ge-0/0/[10]", "ge-1/0/[10-11]"]
        );
        assert_eq!(port_ranges(&names(&["ae0", "ge-0/0/5"])), ["ae0", "ge-0/0/[5]"]);
        assert!(port_ranges(&[]).is_empty());
    }

    #[test]
    fn test_radius_block_layout() {
        let radius = RadiusSettings::default();
        let generated = ConfigGenerator::new(&radius).generate(&ParsedDevice::default(), None);
        let lines: Vec<&str> = generated.radius.lines().collect();

        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "set access radius-server 10.147.32.47 port 1812");
        assert_eq!(lines[2], "set access radius-server 10.147.32.47 source-address 10.148.62.241");
        assert_eq!(lines[6], "set access profile 802.1x-auth accounting-order radius");
        assert_eq!(
            lines[12],
            "set protocols dot1x authenticator authentication-profile-name 802.1x-auth"
        );
        assert!(generated.dot1x.is_empty());
        assert!(generated.cleanup.is_empty());
        assert!(generated.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let radius = RadiusSettings::default();
        let device = ConfigParser::default().parse(SAMPLE);
        let generator = ConfigGenerator::new(&radius);

        let first = generator.generate(&device, None);
        let second = generator.generate(&device, None);
        assert_eq!(first, second);
        assert_eq!(
            first.render_document(timestamp()),
            second.render_document(timestamp())
        );
    }

    #[test]
    fn test_document_contains_blocks() {
        let radius = RadiusSettings::default();
        let device = ConfigParser::default().parse(SAMPLE);
        let generated = ConfigGenerator::new(&radius).generate(&device, None);
        let doc = generated.render_document(timestamp());

        assert!(doc.starts_with("# ISE 802.1X configuration\n# Generated: 2026-10-19 09:30:00\n"));
        assert!(doc.contains("# Switch: myswitch\n"));
        assert!(doc.contains(&format!("\n{}\n", generated.radius)));
        assert!(doc.contains(&format!("\n{}\n", generated.dot1x)));
        assert!(doc.contains(&format!("\n{}\n", generated.cleanup)));
        assert!(doc.contains("# Interfaces: ge-0/0/5\n"));

        // Statement lines are exactly the three blocks, in order.
        let statements: Vec<&str> = doc
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        let expected: Vec<&str> = [&generated.radius, &generated.dot1x, &generated.cleanup]
            .iter()
            .flat_map(|b| b.lines())
            .collect();
        assert_eq!(statements, expected);
    }
}
