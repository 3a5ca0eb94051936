//! Response type for command execution results.

use std::fmt;
use std::time::Duration;

use crate::error::{DriverError, Result};
use crate::platform::ShellMode;

/// Why a command that completed was classified as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The output contained a platform or request error marker.
    ErrorMarker,
    /// The output did not have the expected shape.
    UnexpectedOutput,
}

/// Failure classification attached to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// What kind of failure.
    pub kind: FailureKind,
    /// The offending output line, or a description of the expectation.
    pub message: String,
}

/// Response from a command execution.
///
/// Output never contains the echoed command, the trailing prompt, or any
/// hidden follow-up input.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// The command that was executed.
    pub command: String,

    /// The command output (echo and trailing prompt removed).
    pub output: String,

    /// The prompt that was matched at the end.
    pub prompt: String,

    /// Mode proven by that prompt.
    pub mode: ShellMode,

    /// Whether the command succeeded.
    pub success: bool,

    /// Failure classification if the command failed.
    pub failure: Option<Failure>,

    /// Time taken to execute the command.
    pub elapsed: Duration,

    /// True when the command was not resent because its milestone already
    /// held after an unclear failure.
    pub already_applied: bool,
}

impl CommandResponse {
    pub(crate) fn new(
        command: impl Into<String>,
        output: impl Into<String>,
        prompt: impl Into<String>,
        mode: ShellMode,
        elapsed: Duration,
        failure: Option<Failure>,
    ) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            prompt: prompt.into(),
            mode,
            success: failure.is_none(),
            failure,
            elapsed,
            already_applied: false,
        }
    }

    pub(crate) fn already_applied(
        command: impl Into<String>,
        mode: ShellMode,
        elapsed: Duration,
    ) -> Self {
        Self {
            already_applied: true,
            ..Self::new(command, "", "", mode, elapsed, None)
        }
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Failure message, if any.
    pub fn failure_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }

    /// Turn a failed response into [`DriverError::CommandFailed`].
    pub fn into_result(self) -> Result<Self> {
        match self.failure {
            None => Ok(self),
            Some(failure) => Err(DriverError::CommandFailed {
                command: self.command,
                message: failure.message,
                output: self.output,
                elapsed: self.elapsed,
            }
            .into()),
        }
    }
}

impl fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.output)
    }
}
