//! PTY channel: send text, read until a predicate holds on the buffer.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Result};
use crate::transport::ShellIo;

/// Configuration for PTY channel behavior.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Search depth for pattern matching.
    pub search_depth: usize,

    /// Line terminator appended by [`PtyChannel::send_line`].
    pub line_ending: &'static str,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            search_depth: 1000,
            line_ending: "\n",
        }
    }
}

/// Interactive shell channel with pattern-based reads.
///
/// Owns exactly one shell stream. Reads accumulate chunks into a
/// [`PatternBuffer`] and re-evaluate the caller's predicate after every
/// chunk, so a prompt split across reads is seen as soon as its last byte
/// arrives.
pub struct PtyChannel<S: ShellIo> {
    /// The underlying shell stream.
    io: S,

    /// Configuration for this channel.
    config: PtyConfig,

    /// Pattern buffer for accumulating output.
    buffer: PatternBuffer,

    /// Whether the channel is open.
    is_open: bool,
}

impl<S: ShellIo> PtyChannel<S> {
    /// Wrap an open shell stream.
    pub fn new(io: S, config: PtyConfig) -> Self {
        Self {
            buffer: PatternBuffer::new(config.search_depth),
            io,
            config,
            is_open: true,
        }
    }

    /// Check if the channel is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Get a reference to the buffer.
    pub fn buffer(&self) -> &PatternBuffer {
        &self.buffer
    }

    /// Get the configuration.
    pub fn config(&self) -> &PtyConfig {
        &self.config
    }

    /// Write raw bytes.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_open {
            return Err(ChannelError::NotOpen.into());
        }
        if let Err(e) = self.io.write(data).await {
            self.is_open = false;
            debug!("write failed, marking channel closed: {}", e);
            return Err(ChannelError::ConnectionLost {
                partial: self.take_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Write a line of text followed by the configured line ending.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let mut line = Vec::with_capacity(text.len() + self.config.line_ending.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(self.config.line_ending.as_bytes());
        self.send_raw(&line).await
    }

    /// Read until `done` returns true for the accumulated buffer, or until
    /// `timeout` elapses.
    ///
    /// On success the whole buffer is returned and the channel starts the
    /// next read from empty. On timeout or a closed stream the captured
    /// output travels with the error.
    pub async fn read_until<F>(&mut self, done: F, timeout: Duration) -> Result<Bytes>
    where
        F: Fn(&PatternBuffer) -> bool,
    {
        let deadline = Instant::now() + timeout;

        loop {
            if done(&self.buffer) {
                return Ok(self.buffer.take());
            }
            if !self.is_open {
                return Err(ChannelError::ConnectionLost {
                    partial: self.take_string(),
                }
                .into());
            }

            match tokio::time::timeout_at(deadline, self.io.read_chunk()).await {
                Err(_) => {
                    return Err(ChannelError::ReadTimeout {
                        waited: timeout,
                        partial: self.take_string(),
                    }
                    .into());
                }
                Ok(Ok(Some(chunk))) => {
                    trace!("read {} bytes", chunk.len());
                    self.buffer.extend(&chunk);
                }
                Ok(Ok(None)) => {
                    debug!("shell stream closed by remote");
                    self.is_open = false;
                }
                Ok(Err(e)) => {
                    debug!("read failed, marking channel closed: {}", e);
                    self.is_open = false;
                }
            }
        }
    }

    /// Drop whatever is buffered.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Close the stream. Safe to call repeatedly and after a failure.
    pub async fn close(&mut self) -> Result<()> {
        self.is_open = false;
        self.buffer.clear();
        self.io.close().await
    }

    fn take_string(&mut self) -> String {
        String::from_utf8_lossy(&self.buffer.take()).into_owned()
    }
}
