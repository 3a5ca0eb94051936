//! Command requests: what to send, in which mode, and how to answer the
//! sub-prompts it raises.
//!
//! Interactive sequences are plain data. A request carries an ordered list
//! of [`FollowUp`]s, each pairing the sub-prompt fragment to wait for with
//! the text to send once it appears:
//!
//! ```rust
//! use gaiash::driver::CommandRequest;
//! use gaiash::platform::ShellMode;
//!
//! let request = CommandRequest::new("set expert-password")
//!     .in_mode(ShellMode::Restricted)
//!     .hidden_follow_up("password:", "NewSecret1!")
//!     .hidden_follow_up("password:", "NewSecret1!")
//!     .guarded_by("privileged-password-set");
//! assert_eq!(request.follow_ups.len(), 2);
//! ```

use std::fmt;
use std::time::Duration;

use regex::bytes::Regex;

use super::retry::RetryPolicy;
use crate::channel::SubPrompt;
use crate::platform::ShellMode;

/// Replacement text for hidden inputs in logs, errors and output.
pub const REDACTED: &str = "<hidden>";

/// What may happen if a request is sent again after an unclear failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Idempotency {
    /// Pure query. Always safe to resend.
    ReadOnly,

    /// State-changing, but the named milestone tells whether it already
    /// took effect. Re-queried before any resend.
    Guarded(String),

    /// State-changing with no way to tell. Never resent once it may have
    /// reached the appliance.
    #[default]
    Unsafe,
}

/// Expectation on the output of a successful command.
#[derive(Debug, Clone, Default)]
pub enum OutputCheck {
    /// Any output, including none.
    #[default]
    Any,

    /// At least one non-blank character.
    NonEmpty,

    /// Output must contain this text.
    Contains(String),

    /// Output must match this pattern.
    Pattern(Regex),
}

impl OutputCheck {
    /// Returns a failure message if `output` does not meet the expectation.
    pub fn violation(&self, output: &str) -> Option<String> {
        match self {
            OutputCheck::Any => None,
            OutputCheck::NonEmpty if output.trim().is_empty() => {
                Some("expected output, got none".to_string())
            }
            OutputCheck::NonEmpty => None,
            OutputCheck::Contains(text) if !output.contains(text.as_str()) => {
                Some(format!("expected output containing {:?}", text))
            }
            OutputCheck::Contains(_) => None,
            OutputCheck::Pattern(re) if !re.is_match(output.as_bytes()) => {
                Some(format!("expected output matching /{}/", re.as_str()))
            }
            OutputCheck::Pattern(_) => None,
        }
    }
}

/// One interactive step: wait for `expect`, then send `input`.
#[derive(Clone)]
pub struct FollowUp {
    /// Sub-prompt that must appear before the input is sent.
    pub expect: SubPrompt,

    /// Text to send.
    pub input: String,

    /// Keep the input out of logs, errors and captured output.
    pub hidden: bool,

    /// Timeout for this step; falls back to the request timeout.
    pub timeout: Option<Duration>,

    /// Send a line ending after the input.
    pub newline: bool,
}

impl FollowUp {
    /// Answer a sub-prompt with visible text.
    pub fn new(expect: SubPrompt, input: impl Into<String>) -> Self {
        Self {
            expect,
            input: input.into(),
            hidden: false,
            timeout: None,
            newline: true,
        }
    }

    /// Answer a sub-prompt with a secret.
    pub fn hidden(expect: SubPrompt, input: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::new(expect, input)
        }
    }

    /// Set a timeout for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the input without a trailing line ending (single-key answers).
    pub fn without_newline(mut self) -> Self {
        self.newline = false;
        self
    }

    /// The input as it may appear in logs.
    pub fn display_input(&self) -> &str {
        if self.hidden { REDACTED } else { &self.input }
    }
}

impl fmt::Debug for FollowUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowUp")
            .field("expect", &self.expect)
            .field("input", &self.display_input())
            .field("hidden", &self.hidden)
            .field("timeout", &self.timeout)
            .field("newline", &self.newline)
            .finish()
    }
}

/// A single logical command.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command line sent to the shell.
    pub command: String,

    /// Shown instead of `command` in logs and errors when set.
    pub label: Option<String>,

    /// Mode the command must run in; `None` runs it wherever the shell is.
    pub mode: Option<ShellMode>,

    /// Interactive answers, in order.
    pub follow_ups: Vec<FollowUp>,

    /// Per-step timeout; falls back to the session's command timeout.
    pub timeout: Option<Duration>,

    /// Resend policy after an unclear failure.
    pub idempotency: Idempotency,

    /// Expectation on the output.
    pub check: OutputCheck,

    /// Error markers checked in addition to the platform's.
    pub failure_markers: Vec<Regex>,

    /// How long to keep reconnecting if the connection drops while this
    /// request runs; falls back to the session's retry policy.
    pub reconnect: Option<RetryPolicy>,
}

impl CommandRequest {
    /// A state-changing command. Not resent after an unclear failure.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            label: None,
            mode: None,
            follow_ups: Vec::new(),
            timeout: None,
            idempotency: Idempotency::Unsafe,
            check: OutputCheck::Any,
            failure_markers: Vec::new(),
            reconnect: None,
        }
    }

    /// A read-only query.
    pub fn query(command: impl Into<String>) -> Self {
        Self::new(command).read_only()
    }

    /// Describe the command as `label` in logs, errors and captured
    /// output. For command lines that embed secrets.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The command as it may appear in logs.
    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.command)
    }

    /// Run in the given mode.
    pub fn in_mode(mut self, mode: ShellMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Run in the privileged shell.
    pub fn privileged(self) -> Self {
        self.in_mode(ShellMode::Privileged)
    }

    /// Run in the restricted shell.
    pub fn restricted(self) -> Self {
        self.in_mode(ShellMode::Restricted)
    }

    /// Wait for `fragment` (case-insensitive), then send `input`.
    pub fn follow_up(self, fragment: &str, input: impl Into<String>) -> Self {
        self.with_follow_up(FollowUp::new(SubPrompt::fragment(fragment), input))
    }

    /// Like [`follow_up`](Self::follow_up) but the input is a secret.
    pub fn hidden_follow_up(self, fragment: &str, input: impl Into<String>) -> Self {
        self.with_follow_up(FollowUp::hidden(SubPrompt::fragment(fragment), input))
    }

    /// Append a fully specified follow-up.
    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_ups.push(follow_up);
        self
    }

    /// Set the per-step timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reconnect under `policy` when the connection drops during this
    /// request, e.g. a command that reboots the appliance.
    pub fn reconnect_policy(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Mark as safe to resend.
    pub fn read_only(mut self) -> Self {
        self.idempotency = Idempotency::ReadOnly;
        self
    }

    /// Mark as guarded by a milestone.
    pub fn guarded_by(mut self, milestone: impl Into<String>) -> Self {
        self.idempotency = Idempotency::Guarded(milestone.into());
        self
    }

    /// Set the output expectation.
    pub fn expect_output(mut self, check: OutputCheck) -> Self {
        self.check = check;
        self
    }

    /// Add an error marker for this command only.
    pub fn failure_marker(mut self, marker: Regex) -> Self {
        self.failure_markers.push(marker);
        self
    }

    /// Replace every hidden input found in `text`, and the command line
    /// itself when the request is labelled.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        if let Some(label) = &self.label {
            let command = self.command.trim();
            if !command.is_empty() && out.contains(command) {
                out = out.replace(command, label);
            }
        }
        for f in self.follow_ups.iter().filter(|f| f.hidden && !f.input.is_empty()) {
            if out.contains(f.input.as_str()) {
                out = out.replace(f.input.as_str(), REDACTED);
            }
        }
        out
    }
}
