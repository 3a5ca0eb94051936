//! SSH transport layer wrapping russh.
//!
//! This module provides connection setup, authentication and the
//! interactive shell channel, behind the [`ShellIo`]/[`Connector`] seam the
//! rest of the crate is written against.

pub mod config;
#[cfg(test)]
pub(crate) mod fake;
mod shell;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use shell::{Connector, ShellIo};
pub use ssh::{SshConnector, SshShell, SshTransport};
