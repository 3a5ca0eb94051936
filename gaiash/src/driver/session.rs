//! One live shell session.

use std::time::Duration;

use tokio::time::Instant;

use crate::channel::PtyChannel;
use crate::platform::ShellMode;
use crate::transport::ShellIo;

/// A live session owned by a [`ConnectionManager`](super::ConnectionManager).
///
/// The mode is only ever written by the manager after it has read a
/// prompt. Callers can look at it but cannot set it.
pub struct Session<S: ShellIo> {
    target: String,
    principal: String,
    mode: ShellMode,
    prompt: String,
    banner: String,
    opened_at: Instant,
    pub(crate) channel: PtyChannel<S>,
}

impl<S: ShellIo> Session<S> {
    pub(crate) fn new(
        target: String,
        principal: String,
        channel: PtyChannel<S>,
        mode: ShellMode,
        prompt: String,
        banner: String,
    ) -> Self {
        Self {
            target,
            principal,
            mode,
            prompt,
            banner,
            opened_at: Instant::now(),
            channel,
        }
    }

    /// `host:port` this session is connected to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Authenticated user.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Mode proven by the most recent prompt.
    pub fn mode(&self) -> ShellMode {
        self.mode
    }

    /// Most recent prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Text received before the first prompt.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Time since the session was opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Whether the underlying channel is still open.
    pub fn is_alive(&self) -> bool {
        self.channel.is_open()
    }

    pub(crate) fn observe_prompt(&mut self, mode: ShellMode, prompt: String) {
        self.mode = mode;
        self.prompt = prompt;
    }
}

impl<S: ShellIo> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("principal", &self.principal)
            .field("mode", &self.mode)
            .field("prompt", &self.prompt)
            .field("alive", &self.is_alive())
            .finish()
    }
}
