//! Juniper Junos profile.
//!
//! Junos logins land either in the operational CLI (`user@switch>`) or, for
//! root and some service accounts, in the FreeBSD shell (`root@switch:RE:0%`),
//! from which `cli` is needed first.
//!
//! ```text
//! root@switch:RE:0% cli
//! {master:0}
//! root@switch> set cli screen-length 0
//! root@switch> show configuration | display set | no-more
//! ```

use crate::platform::{ContentValidator, VendorFamily, VendorProfile};

/// Dump command producing one `set` statement per line.
pub const DISPLAY_SET: &str = "show configuration | display set | no-more";

/// Dump command producing the hierarchical (curly brace) form.
pub const DISPLAY_PLAIN: &str = "show configuration | no-more";

/// Validator for `display set` output.
pub fn set_validator() -> ContentValidator {
    ContentValidator::new([
        r"set\s+system\s+host-name",
        r"set\s+interfaces\s+",
        r"set\s+protocols\s+",
        r"set\s+policy-options\s+",
        r"set\s+security\s+",
        r"set\s+routing-options\s+",
    ])
    .expect("static regex")
}

/// Validator for the hierarchical configuration form.
pub fn hierarchical_validator() -> ContentValidator {
    ContentValidator::new([
        r"^\s*system\s*\{",
        r"^\s*host-name\s+\S+;",
        r"^\s*interfaces\s*\{",
        r"^\s*protocols\s*\{",
        r"^\s*vlans\s*\{",
    ])
    .expect("static regex")
}

/// Create the Junos profile.
pub fn profile() -> VendorProfile {
    VendorProfile::new(VendorFamily::Juniper, DISPLAY_SET, set_validator())
        .with_cli_command("cli")
        .with_on_open_command("set cli screen-length 0")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("error: ")
        .with_failure_pattern("missing argument")
}
