//! Raw byte-stream seam between the protocol layers and a live shell.
//!
//! Everything above this module (prompt matching, command exchanges, mode
//! switching) only needs to write bytes and read chunks. Keeping the seam
//! this narrow lets the protocol run against a scripted transcript in tests
//! exactly as it runs against a real SSH channel.

use std::future::Future;

use super::config::SshConfig;
use crate::error::Result;

/// One interactive shell stream.
pub trait ShellIo: Send {
    /// Write raw bytes to the shell.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next chunk of output.
    ///
    /// Returns `Ok(None)` once the remote side has closed the stream.
    fn read_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the stream. Must be safe to call more than once.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens authenticated shells.
pub trait Connector: Send + Sync {
    /// Shell type produced by this connector.
    type Shell: ShellIo;

    /// Connect, authenticate and start an interactive shell.
    fn open(&self, config: &SshConfig) -> impl Future<Output = Result<Self::Shell>> + Send;
}
