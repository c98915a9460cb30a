//! Channel layer: buffering, classification and bounded reads.
//!
//! This module handles the interactive session plumbing below the relay
//! automaton, with no knowledge of which step the automaton is in.

mod buffer;
mod classifier;
mod pty;
mod reader;

pub use buffer::{CapturedOutput, DEFAULT_SEARCH_DEPTH};
pub use classifier::{
    AUTH_FAILURE_PHRASES, Classifier, LearnedPrompt, PromptKind, UNREACHABLE_PHRASES, Verdict,
    trailing_prompt,
};
pub use pty::{PtyChannel, PtyConfig, ShellIo};
pub use reader::{ChannelReader, Completion, WaitOutcome};
