//! Cisco IOS / Aruba profile.
//!
//! Both land directly in an exec prompt (`switch>` or `switch#`) and print
//! `running-config` in the indented `interface` / `hostname` style.

use crate::platform::{ContentValidator, VendorFamily, VendorProfile};

pub const RUNNING_CONFIG: &str = "show running-config";

pub const PAGING_OFF: &str = "terminal length 0";

/// Validator for `running-config` output.
pub fn validator() -> ContentValidator {
    ContentValidator::new([
        r"hostname\s+\S+",
        r"interface\s+\S+",
        r"ip\s+address\s+",
        r"router\s+\S+",
        r"vlan\s+\d+",
        r"switchport\s+",
    ])
    .expect("static regex")
}

/// Create the Cisco/Aruba profile.
pub fn profile() -> VendorProfile {
    VendorProfile::new(VendorFamily::Cisco, RUNNING_CONFIG, validator())
        .with_on_open_command(PAGING_OFF)
        .with_failure_pattern("% invalid input")
        .with_failure_pattern("% incomplete command")
        .with_failure_pattern("% ambiguous command")
        .with_failure_pattern("invalid input:")
        .with_auth_failure("% login invalid")
}
