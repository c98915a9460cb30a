//! # relaycfg
//!
//! Retrieve switch configuration through an SSH jump host and derive
//! 802.1X port configuration from it.
//!
//! Targets are usually only reachable from a bastion. relaycfg logs into
//! the bastion over SSH and then either drives its shell through an inner
//! `ssh` hop ([`RelaySession`]) or execs one-shot `sshpass ssh` command
//! variants until one returns plausible configuration ([`Prober`]).
//!
//! ## Features
//!
//! - Async SSH to the jump host via russh, with OpenSSH-style host key policy
//! - Prompt, password, host-key and failure detection on a raw byte stream
//! - Prompt/idle/deadline completion for multi-thousand-line dumps
//! - Junos and Cisco/Aruba command variants with content validation
//! - Junos `set` parsing and 802.1X / RADIUS generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaycfg::{RetrievalRequest, Retriever, Settings, SshConnector};
//! use secrecy::SecretString;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relaycfg::Error> {
//!     let request = RetrievalRequest::new(
//!         "bastion.example.net",
//!         "ops",
//!         SecretString::from("jump-secret".to_string()),
//!         "10.148.62.10,10.148.62.11",
//!         "netadmin",
//!         Some(SecretString::from("device-secret".to_string())),
//!     )?;
//!
//!     let settings = Settings::default();
//!     let retriever = Retriever::new(&SshConnector, &settings, CancellationToken::new());
//!     let result = retriever.retrieve(&request).await;
//!
//!     for target in result.succeeded() {
//!         println!("{}: {:?}", target.target, target.hostname);
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod device;
pub mod driver;
pub mod error;
pub mod output;
pub mod platform;
pub mod retrieve;
pub mod settings;
pub mod transport;

// Re-export main types for convenience
pub use device::{ConfigGenerator, ConfigParser, GeneratedConfig, ParsedDevice, Sanitizer};
pub use driver::{CapturedConfig, Prober, RelaySession, RelayTarget, RelayTargetBuilder, SessionState};
pub use error::{Error, ErrorKind, Result};
pub use platform::{CommandCatalog, VendorFamily};
pub use retrieve::{RetrievalRequest, RetrievalResult, Retriever, TargetOutcome};
pub use settings::{RetrievalMode, Settings};
pub use transport::{SshConfig, SshConnector};
