//! Builder for relay targets.

use std::fmt;

use secrecy::SecretString;

use crate::error::{RelayError, Result};
use crate::platform::VendorFamily;
use crate::settings::Settings;
use crate::transport::SshConfig;

/// Everything needed to reach one device through the jump host.
///
/// Immutable once built; a session only borrows it.
#[derive(Clone)]
pub struct RelayTarget {
    jump_host: String,
    jump_port: u16,
    jump_user: String,
    jump_password: SecretString,
    target_host: String,
    target_user: String,
    target_password: Option<SecretString>,
    vendor: Option<VendorFamily>,
}

impl RelayTarget {
    pub fn jump_host(&self) -> &str {
        &self.jump_host
    }

    pub fn jump_user(&self) -> &str {
        &self.jump_user
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    pub fn target_user(&self) -> &str {
        &self.target_user
    }

    pub fn target_password(&self) -> Option<&SecretString> {
        self.target_password.as_ref()
    }

    pub fn vendor(&self) -> Option<VendorFamily> {
        self.vendor
    }

    /// `user@host` of the jump host, used as relay identity in headers.
    pub fn relay_identity(&self) -> String {
        format!("{}@{}", self.jump_user, self.jump_host)
    }

    /// SSH configuration for the jump-host connection.
    pub fn jump_config(&self, settings: &Settings) -> SshConfig {
        let mut config = SshConfig::new(
            self.jump_host.clone(),
            self.jump_user.clone(),
            self.jump_password.clone(),
        );
        config.port = self.jump_port;
        config.timeout = settings.timeouts.connect;
        config.host_key_verification = settings.relay.host_key_verification.clone();
        config.known_hosts_path = settings.relay.known_hosts_path.clone();
        config
    }
}

impl fmt::Debug for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayTarget")
            .field("jump_host", &self.jump_host)
            .field("jump_port", &self.jump_port)
            .field("jump_user", &self.jump_user)
            .field("jump_password", &"********")
            .field("target_host", &self.target_host)
            .field("target_user", &self.target_user)
            .field("target_password", &self.target_password.as_ref().map(|_| "********"))
            .field("vendor", &self.vendor)
            .finish()
    }
}

/// Builder for [`RelayTarget`].
///
/// # Example
///
/// ```rust
/// use relaycfg::driver::RelayTargetBuilder;
///
/// # fn example() -> Result<(), relaycfg::Error> {
/// let target = RelayTargetBuilder::new("bastion.example.net")
///     .jump_user("ops")
///     .jump_password("jump-secret")
///     .target("10.148.62.10")
///     .target_user("netadmin")
///     .target_password("device-secret")
///     .build()?;
/// assert_eq!(target.relay_identity(), "ops@bastion.example.net");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayTargetBuilder {
    jump_host: String,
    jump_port: Option<u16>,
    jump_user: Option<String>,
    jump_password: Option<SecretString>,
    target_host: Option<String>,
    target_user: Option<String>,
    target_password: Option<SecretString>,
    vendor: Option<VendorFamily>,
}

impl RelayTargetBuilder {
    /// Start a builder for the given jump host.
    pub fn new(jump_host: impl Into<String>) -> Self {
        Self {
            jump_host: jump_host.into(),
            ..Self::default()
        }
    }

    /// Set the jump-host SSH port (default: 22).
    pub fn jump_port(mut self, port: u16) -> Self {
        self.jump_port = Some(port);
        self
    }

    pub fn jump_user(mut self, user: impl Into<String>) -> Self {
        self.jump_user = Some(user.into());
        self
    }

    pub fn jump_password(mut self, password: impl Into<String>) -> Self {
        self.jump_password = Some(SecretString::from(password.into()));
        self
    }

    pub fn jump_secret(mut self, password: SecretString) -> Self {
        self.jump_password = Some(password);
        self
    }

    /// Set the target device address.
    pub fn target(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    pub fn target_user(mut self, user: impl Into<String>) -> Self {
        self.target_user = Some(user.into());
        self
    }

    pub fn target_password(mut self, password: impl Into<String>) -> Self {
        self.target_password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the target password; `None` means the hop must not ask for one.
    pub fn target_secret(mut self, password: Option<SecretString>) -> Self {
        self.target_password = password;
        self
    }

    /// Restrict to one vendor family.
    pub fn vendor(mut self, vendor: Option<VendorFamily>) -> Self {
        self.vendor = vendor;
        self
    }

    /// Build the target. Jump user, jump password, target address and
    /// target user are required.
    pub fn build(self) -> Result<RelayTarget> {
        let jump_host = self.jump_host.trim().to_string();
        if jump_host.is_empty() {
            return Err(RelayError::InvalidRequest("jump host is required".into()).into());
        }
        let jump_user = required(self.jump_user, "jump user")?;
        let jump_password = self
            .jump_password
            .ok_or_else(|| RelayError::InvalidRequest("jump password is required".into()))?;
        let target_host = required(self.target_host, "target address")?;
        let target_user = required(self.target_user, "target user")?;

        Ok(RelayTarget {
            jump_host,
            jump_port: self.jump_port.unwrap_or(22),
            jump_user,
            jump_password,
            target_host,
            target_user,
            target_password: self.target_password,
            vendor: self.vendor,
        })
    }
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest(format!("{what} is required")).into())
}
