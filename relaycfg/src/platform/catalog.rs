//! Ordered catalog of command variants for the prober.

use super::definition::VendorFamily;
use super::validator::ContentValidator;
use super::vendors::{cisco, juniper};

/// One command variant and the validator its output must pass.
///
/// Attempts are stateless: none depends on the output of another.
#[derive(Debug, Clone)]
pub struct CommandAttempt {
    pub family: VendorFamily,

    /// Short operator-facing description.
    pub label: String,

    /// Command run on the target (not including the hop).
    pub command: String,

    pub validator: ContentValidator,
}

impl CommandAttempt {
    pub fn new(
        family: VendorFamily,
        label: impl Into<String>,
        command: impl Into<String>,
        validator: ContentValidator,
    ) -> Self {
        Self {
            family,
            label: label.into(),
            command: command.into(),
            validator,
        }
    }
}

/// Attempts in priority order.
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    attempts: Vec<CommandAttempt>,
}

impl CommandCatalog {
    pub fn new(attempts: Vec<CommandAttempt>) -> Self {
        Self { attempts }
    }

    /// Junos `display set`, Junos hierarchical, then Cisco/Aruba
    /// `running-config`, each first as a plain command and then in the
    /// form that also works from a login shell.
    pub fn builtin() -> Self {
        let junos_set = juniper::set_validator();
        let junos_plain = juniper::hierarchical_validator();
        let cisco = cisco::validator();

        Self::new(vec![
            CommandAttempt::new(
                VendorFamily::Juniper,
                "Junos CLI (set format)",
                juniper::DISPLAY_SET,
                junos_set.clone(),
            ),
            CommandAttempt::new(
                VendorFamily::Juniper,
                "Junos shell (set format)",
                format!("cli -c \"{}\"", juniper::DISPLAY_SET),
                junos_set,
            ),
            CommandAttempt::new(
                VendorFamily::Juniper,
                "Junos CLI (standard format)",
                juniper::DISPLAY_PLAIN,
                junos_plain.clone(),
            ),
            CommandAttempt::new(
                VendorFamily::Juniper,
                "Junos shell (standard format)",
                format!("cli -c \"{}\"", juniper::DISPLAY_PLAIN),
                junos_plain,
            ),
            CommandAttempt::new(
                VendorFamily::Cisco,
                "Cisco/Aruba running-config (paging off)",
                format!("{}; {}", cisco::PAGING_OFF, cisco::RUNNING_CONFIG),
                cisco.clone(),
            ),
            CommandAttempt::new(
                VendorFamily::Cisco,
                "Cisco/Aruba running-config",
                cisco::RUNNING_CONFIG,
                cisco,
            ),
        ])
    }

    /// Keep only the attempts of `family`, if given.
    pub fn restricted_to(mut self, family: Option<VendorFamily>) -> Self {
        if let Some(family) = family {
            self.attempts.retain(|a| a.family == family);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandAttempt> {
        self.attempts.iter()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let catalog = CommandCatalog::builtin();
        let families: Vec<_> = catalog.iter().map(|a| a.family).collect();
        assert_eq!(
            families,
            [
                VendorFamily::Juniper,
                VendorFamily::Juniper,
                VendorFamily::Juniper,
                VendorFamily::Juniper,
                VendorFamily::Cisco,
                VendorFamily::Cisco
            ]
        );
        assert_eq!(
            catalog.iter().next().map(|a| a.command.as_str()),
            Some("show configuration | display set | no-more")
        );
    }

    #[test]
    fn test_vendor_hint_restricts() {
        let catalog = CommandCatalog::builtin().restricted_to(Some(VendorFamily::Cisco));
        assert_eq!(catalog.len(), 2);
        assert!(catalog.iter().all(|a| a.family == VendorFamily::Cisco));

        assert_eq!(CommandCatalog::builtin().restricted_to(None).len(), 6);
    }
}
