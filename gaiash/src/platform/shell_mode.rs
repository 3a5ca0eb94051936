//! Shell modes and the commands that move between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The command interpreter a prompt belongs to.
///
/// A mode is always derived from an observed prompt. Nothing in the crate
/// sets it from a requested or assumed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellMode {
    /// The default, limited command shell (`gw> `).
    Restricted,
    /// The secret-gated full shell (`[Expert@gw:0]# `).
    Privileged,
    /// No prompt has been classified yet.
    #[default]
    Unknown,
}

impl ShellMode {
    /// Whether this mode is a real shell that commands can target.
    pub fn is_known(self) -> bool {
        self != ShellMode::Unknown
    }
}

impl fmt::Display for ShellMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShellMode::Restricted => "restricted",
            ShellMode::Privileged => "privileged",
            ShellMode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How to get from the restricted shell into the privileged one and back.
#[derive(Debug, Clone)]
pub struct ModeSwitch {
    /// Command that asks for the privileged shell (e.g. `expert`).
    pub escalate_command: String,

    /// Fragment of the sub-prompt that asks for the secret.
    pub secret_prompt: String,

    /// Command that leaves the privileged shell (e.g. `exit`).
    pub deescalate_command: String,
}

impl ModeSwitch {
    /// Create a mode switch definition.
    pub fn new(
        escalate_command: impl Into<String>,
        secret_prompt: impl Into<String>,
        deescalate_command: impl Into<String>,
    ) -> Self {
        Self {
            escalate_command: escalate_command.into(),
            secret_prompt: secret_prompt.into(),
            deescalate_command: deescalate_command.into(),
        }
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::new("expert", "password:", "exit")
    }
}
