//! States of the relay session automaton.

use std::fmt;

use serde::Serialize;

/// Where a relay session is in its transition chain.
///
/// ```text
/// Idle -> JumpConnected -> ShellOpened -> HopCommandSent
///      -> [AwaitingTargetAuth] -> TargetAuthenticated -> CliEntered
///      -> CommandSent -> Collecting -> Done
/// ```
///
/// `Error` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    JumpConnected,
    ShellOpened,
    HopCommandSent,
    AwaitingTargetAuth,
    TargetAuthenticated,
    CliEntered,
    CommandSent,
    Collecting,
    Done,
    Error,
}

impl SessionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Error {
            return true;
        }
        matches!(
            (self, next),
            (Idle, JumpConnected)
                | (JumpConnected, ShellOpened)
                | (ShellOpened, HopCommandSent)
                | (HopCommandSent, AwaitingTargetAuth)
                // no password asked (key trust between jump and target)
                | (HopCommandSent, TargetAuthenticated)
                | (AwaitingTargetAuth, TargetAuthenticated)
                | (TargetAuthenticated, CliEntered)
                | (CliEntered, CommandSent)
                | (CommandSent, Collecting)
                | (Collecting, Done)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::JumpConnected => "JumpConnected",
            Self::ShellOpened => "ShellOpened",
            Self::HopCommandSent => "HopCommandSent",
            Self::AwaitingTargetAuth => "AwaitingTargetAuth",
            Self::TargetAuthenticated => "TargetAuthenticated",
            Self::CliEntered => "CliEntered",
            Self::CommandSent => "CommandSent",
            Self::Collecting => "Collecting",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
