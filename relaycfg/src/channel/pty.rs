//! PTY channel abstraction for interactive sessions.

use std::future::Future;

use log::trace;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::error::{ChannelError, Result};

/// Byte-level interactive shell.
///
/// The automaton only needs three things from a shell: write bytes, wait
/// for the next chunk of output and shut the channel down.
pub trait ShellIo: Send {
    /// Write raw bytes to the shell.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next chunk of output. `Ok(None)` means the remote side
    /// closed the channel.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the channel.
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Configuration for PTY channel behavior.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Terminal width.
    pub terminal_width: u32,

    /// Terminal height.
    pub terminal_height: u32,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            terminal_width: 511,
            terminal_height: 24,
        }
    }
}

/// Interactive shell channel on a russh session.
pub struct PtyChannel {
    channel: Channel<Msg>,

    /// Configuration for this channel.
    config: PtyConfig,

    /// Whether the channel is open.
    is_open: bool,
}

impl PtyChannel {
    /// Wrap an already opened channel with PTY and shell granted.
    pub fn new(channel: Channel<Msg>, config: PtyConfig) -> Self {
        Self {
            channel,
            config,
            is_open: true,
        }
    }

    /// Check if the channel is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Get the configuration.
    pub fn config(&self) -> &PtyConfig {
        &self.config
    }
}

impl ShellIo for PtyChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_open {
            return Err(ChannelError::Closed.into());
        }
        self.channel.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        while self.is_open {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                // stderr of the shell is part of what the operator would see
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                    self.is_open = false;
                }
                Some(other) => trace!("ignoring channel message {:?}", other),
            }
        }
        Ok(None)
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.is_open {
            self.is_open = false;
            self.channel.close().await.map_err(ChannelError::Ssh)?;
        }
        Ok(())
    }
}
