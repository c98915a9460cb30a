//! Bounded reads on a shell channel.
//!
//! Every read is a wait-for-predicate with a time budget: data is pulled
//! chunk by chunk into a [`CapturedOutput`] and the caller's predicate is
//! re-evaluated after each chunk. Nothing here sleeps for a fixed delay.

use std::time::Duration;

use log::trace;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::buffer::CapturedOutput;
use super::pty::ShellIo;
use crate::error::{RelayError, Result};

/// Result of [`ChannelReader::wait_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The predicate matched.
    Matched(T),
    /// The capture deadline elapsed first.
    TimedOut,
    /// The remote side closed the channel first.
    Closed,
}

/// Why output collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// A trailing prompt followed the payload.
    Prompt,
    /// No new bytes for the idle interval after payload arrived.
    Idle,
    /// The channel closed while collecting.
    Closed,
    /// The absolute deadline elapsed; output may be truncated.
    Deadline,
    /// An exec'd command exited (probe mode).
    Exited,
}

impl Completion {
    /// Whether the output can be trusted to be whole.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Prompt | Self::Idle | Self::Exited)
    }
}

enum Chunk {
    Data(Vec<u8>),
    Silence,
    Closed,
}

/// Reads from a shell, honouring a cancellation token at every await.
pub struct ChannelReader<'a, S> {
    shell: &'a mut S,
    cancel: &'a CancellationToken,
}

impl<'a, S: ShellIo> ChannelReader<'a, S> {
    pub fn new(shell: &'a mut S, cancel: &'a CancellationToken) -> Self {
        Self { shell, cancel }
    }

    /// Send a line terminated by `\n`.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled.into()),
            result = self.shell.send(&data) => result,
        }
    }

    async fn next_chunk(&mut self, wait: Duration) -> Result<Chunk> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled.into()),
            result = tokio::time::timeout(wait, self.shell.recv()) => match result {
                Err(_) => Ok(Chunk::Silence),
                Ok(Ok(Some(data))) => Ok(Chunk::Data(data)),
                Ok(Ok(None)) => Ok(Chunk::Closed),
                Ok(Err(e)) => Err(e),
            },
        }
    }

    /// Read until `predicate` returns `Some`, the channel closes or the
    /// capture deadline passes.
    ///
    /// The predicate is also evaluated before the first read, so data
    /// already in `output` is classified without waiting.
    pub async fn wait_for<T>(
        &mut self,
        output: &mut CapturedOutput,
        mut predicate: impl FnMut(&CapturedOutput) -> Option<T>,
    ) -> Result<WaitOutcome<T>> {
        loop {
            if let Some(found) = predicate(output) {
                return Ok(WaitOutcome::Matched(found));
            }
            let remaining = output.remaining();
            if remaining.is_zero() {
                return Ok(WaitOutcome::TimedOut);
            }
            match self.next_chunk(remaining).await? {
                Chunk::Data(data) => {
                    trace!("read {} bytes", data.len());
                    output.extend(&data);
                }
                Chunk::Silence => return Ok(WaitOutcome::TimedOut),
                Chunk::Closed => return Ok(WaitOutcome::Closed),
            }
        }
    }

    /// Collect output until it looks finished.
    ///
    /// Stops when `finished` holds (prompt after payload), when `idle`
    /// passes without new bytes once `has_payload` holds, or at the
    /// capture deadline. Every received chunk restarts the idle timer.
    pub async fn collect(
        &mut self,
        output: &mut CapturedOutput,
        idle: Duration,
        mut finished: impl FnMut(&CapturedOutput) -> bool,
        mut has_payload: impl FnMut(&CapturedOutput) -> bool,
    ) -> Result<Completion> {
        loop {
            if finished(output) {
                return Ok(Completion::Prompt);
            }
            let remaining = output.remaining();
            if remaining.is_zero() {
                return Ok(Completion::Deadline);
            }
            match self.next_chunk(idle.min(remaining)).await? {
                Chunk::Data(data) => {
                    trace!("collected {} bytes ({} total)", data.len(), output.len());
                    output.extend(&data);
                }
                Chunk::Closed => return Ok(Completion::Closed),
                Chunk::Silence => {
                    if output.is_expired() {
                        return Ok(Completion::Deadline);
                    }
                    if has_payload(output) {
                        return Ok(Completion::Idle);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{Reply, ScriptedShell};

    #[tokio::test]
    async fn test_wait_for_matches_after_chunks() {
        let mut shell = ScriptedShell::new(vec![Reply::now("Last login: today\r\n"), Reply::now("ops@jump$ ")]);
        let cancel = CancellationToken::new();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let mut output = CapturedOutput::new(Duration::from_secs(2));

        let outcome = reader
            .wait_for(&mut output, |o| o.last_line().ends_with("$ ").then_some(()))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Matched(()));
        assert!(output.as_str_lossy().starts_with("Last login"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let mut shell = ScriptedShell::new(vec![Reply::now("no prompt here")]).stay_open();
        let cancel = CancellationToken::new();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let mut output = CapturedOutput::new(Duration::from_millis(100));

        let outcome = reader.wait_for(&mut output, |_| None::<()>).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(output.as_str_lossy(), "no prompt here");
    }

    #[tokio::test]
    async fn test_collect_idle_completion() {
        let mut shell = ScriptedShell::new(vec![Reply::now("set system host-name sw1\r\n")]).stay_open();
        let cancel = CancellationToken::new();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let mut output = CapturedOutput::new(Duration::from_secs(5));

        let completion = reader
            .collect(&mut output, Duration::from_millis(50), |_| false, CapturedOutput::has_content)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Idle);
        assert!(completion.is_complete());
    }

    #[tokio::test]
    async fn test_collect_deadline_keeps_bytes() {
        let mut shell = ScriptedShell::streaming("set interfaces ge-0/0/1 unit 0\r\n", Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let mut output = CapturedOutput::new(Duration::from_millis(150));

        let completion = reader
            .collect(&mut output, Duration::from_millis(100), |_| false, CapturedOutput::has_content)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Deadline);
        assert!(!completion.is_complete());
        assert!(output.as_str_lossy().contains("set interfaces ge-0/0/1"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mut shell = ScriptedShell::new(vec![]).stay_open();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = ChannelReader::new(&mut shell, &cancel);
        let mut output = CapturedOutput::new(Duration::from_secs(5));

        let err = reader.wait_for(&mut output, |_| None::<()>).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }
}
