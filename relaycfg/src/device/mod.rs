//! Retrieved configuration: sanitizing, parsing and generation.
//!
//! Data only flows one way: captured output is sanitized, the sanitized
//! text parsed into a [`ParsedDevice`], and the parsed device turned into a
//! [`GeneratedConfig`].

mod generator;
mod parser;
mod sanitize;

pub use generator::{CLEANUP_STATEMENTS, ConfigGenerator, DOT1X_STATEMENTS, GeneratedConfig, port_ranges};
pub use parser::{ConfigParser, InterfaceName, InterfaceRecord, ParsedDevice, detect_hostname};
pub use sanitize::{NOISE_PREFIXES, Sanitizer};
