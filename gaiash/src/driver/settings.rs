//! Session settings handed in by the caller.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use crate::transport::SshConfig;

/// Per-operation deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Establishing the SSH session and reading the first prompt.
    pub connect: Duration,

    /// Each read step of a command.
    pub command: Duration,

    /// Bare newline probes and post-interrupt resyncs.
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            command: Duration::from_secs(30),
            probe: Duration::from_secs(10),
        }
    }
}

/// Everything a [`ConnectionManager`](super::ConnectionManager) needs to
/// reach and drive one appliance.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Target, principal and transport options.
    pub ssh: SshConfig,

    /// Deadlines.
    pub timeouts: Timeouts,

    /// Retry limits for transient failures.
    pub retry: RetryPolicy,

    /// Secret for entering the privileged shell, if known up front.
    pub privileged_secret: Option<SecretString>,
}

impl SessionSettings {
    /// Settings with default timeouts and retry policy.
    pub fn new(ssh: SshConfig) -> Self {
        Self {
            ssh,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            privileged_secret: None,
        }
    }
}
