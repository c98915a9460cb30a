//! Capture buffer with tail-only prompt search.
//!
//! Only the last `search_depth` bytes are inspected when looking for
//! prompts and error phrases, so classifying a multi-megabyte configuration
//! dump stays cheap no matter how often it is polled.

use std::borrow::Cow;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;

/// Default number of trailing bytes inspected by the classifier.
pub const DEFAULT_SEARCH_DEPTH: usize = 2048;

/// Output accumulated during one read-until-condition operation.
///
/// Carries its own monotonic deadline; it is discarded once the caller has
/// classified the content.
#[derive(Debug)]
pub struct CapturedOutput {
    /// The accumulated output, ANSI escapes removed.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,

    /// Absolute end of the time budget.
    deadline: Instant,

    /// Raw bytes received before ANSI stripping.
    received: usize,
}

impl CapturedOutput {
    /// Start a capture with the given time budget.
    pub fn new(budget: Duration) -> Self {
        Self::with_search_depth(budget, DEFAULT_SEARCH_DEPTH)
    }

    /// Start a capture with a custom tail search depth.
    pub fn with_search_depth(budget: Duration, search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            deadline: Instant::now() + budget,
            received: 0,
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        self.received += data.len();
        let cleaned = strip_ansi_escapes::strip(data);
        self.buffer.extend_from_slice(&cleaned);
    }

    /// The tail region the classifier looks at.
    pub fn tail(&self) -> Cow<'_, str> {
        let mut start = self.buffer.len().saturating_sub(self.search_depth);
        // Start the tail on a line boundary when one is available.
        if start > 0 {
            if let Some(nl) = memchr::memchr(b'\n', &self.buffer[start..]) {
                start += nl + 1;
            }
        }
        String::from_utf8_lossy(&self.buffer[start..])
    }

    /// The last (possibly incomplete) line, carriage returns removed.
    pub fn last_line(&self) -> Cow<'_, str> {
        let end = trim_end_newlines(&self.buffer);
        let data = &self.buffer[..end];
        let start = memchr::memrchr(b'\n', data).map_or(0, |pos| pos + 1);
        let line = String::from_utf8_lossy(&data[start..]);
        if line.contains('\r') {
            Cow::Owned(line.replace('\r', ""))
        } else {
            line
        }
    }

    /// Whether anything other than whitespace was captured.
    pub fn has_content(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Take ownership of the contents as text.
    pub fn into_text(self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Get the current (stripped) buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Raw bytes received, before ANSI stripping.
    pub fn bytes_received(&self) -> usize {
        self.received
    }

    /// The absolute deadline of this capture.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Index just past the last byte that is not `\r` or `\n`, ignoring a
/// trailing line break so a prompt followed by a newline still counts.
fn trim_end_newlines(data: &[u8]) -> usize {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    end
}
