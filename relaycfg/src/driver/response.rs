//! Captured configuration returned by the automaton and the prober.

use std::time::Duration;

use serde::Serialize;

use crate::channel::Completion;
use crate::platform::{Validation, VendorFamily};

/// Raw configuration text pulled from one device.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedConfig {
    /// Target device address.
    pub target: String,

    /// The command whose output this is.
    pub command: String,

    /// Dialect the command belongs to.
    pub family: VendorFamily,

    /// Output as received (ANSI escapes removed), not yet sanitized.
    #[serde(skip)]
    pub raw: String,

    /// Why collection stopped.
    pub completion: Completion,

    /// Raw bytes received for the command.
    pub bytes: usize,

    /// Validator verdict on the output.
    pub validation: Validation,

    /// Device prompt seen in shell mode, used to strip prompt lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Time spent on the retrieval.
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl CapturedConfig {
    /// Output may be truncated: the deadline hit or the channel dropped.
    pub fn is_incomplete(&self) -> bool {
        !self.completion.is_complete()
    }

    pub fn is_validated(&self) -> bool {
        self.validation.is_accepted()
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}
