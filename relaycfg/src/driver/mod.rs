//! Retrieval drivers.
//!
//! Two ways to pull a configuration through the jump host:
//!
//! - [`RelaySession`] drives an interactive shell through the hop, the
//!   target login and the CLI, reading until a prompt or an idle gap.
//! - [`Prober`] exec's each [`CommandAttempt`](crate::platform::CommandAttempt)
//!   as a one-shot `sshpass ssh` and keeps the first validated output.
//!
//! Both take a [`RelayTarget`] and return a [`CapturedConfig`].

mod builder;
mod probe;
mod response;
mod session;
mod state;
mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{RelayTarget, RelayTargetBuilder};
pub use probe::{CRITICAL_SSH_ERRORS, Prober, hop_exec_command};
pub use response::CapturedConfig;
pub use session::RelaySession;
pub use state::SessionState;
pub use transcript::{EntryLevel, HIDDEN_INPUT, Transcript, TranscriptEntry};

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, Result};
use crate::transport::{Connector, SshConfig};

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled.into()),
        result = fut => result,
    }
}

/// Open a jump-host connection, honouring cancellation.
pub(crate) async fn connect<C: Connector>(
    connector: &C,
    config: &SshConfig,
    cancel: &CancellationToken,
) -> Result<C::Connection> {
    cancellable(cancel, connector.connect(config)).await
}
