//! Named appliance milestones for idempotent configuration steps.
//!
//! A milestone is re-derived from a live query every time it is asked for;
//! nothing is cached or persisted between calls.

use regex::bytes::Regex;

use super::request::CommandRequest;
use super::response::CommandResponse;

/// Predicate over the output of a milestone query.
#[derive(Debug, Clone)]
pub enum OutputPredicate {
    /// Output contains the text.
    Contains(String),
    /// Output does not contain the text.
    NotContains(String),
    /// Output matches the pattern.
    Matches(Regex),
}

impl OutputPredicate {
    /// Evaluate against `output`.
    pub fn holds(&self, output: &str) -> bool {
        match self {
            OutputPredicate::Contains(text) => output.contains(text.as_str()),
            OutputPredicate::NotContains(text) => !output.contains(text.as_str()),
            OutputPredicate::Matches(re) => re.is_match(output.as_bytes()),
        }
    }
}

/// How a milestone is checked.
#[derive(Debug, Clone)]
pub enum MilestoneCheck {
    /// Run a read-only command and test its output.
    Query {
        request: CommandRequest,
        predicate: OutputPredicate,
    },

    /// The privileged shell can be entered with the configured secret.
    /// The shell is returned to the mode it started in.
    PrivilegedReachable,
}

/// A named, queryable configuration checkpoint.
#[derive(Debug, Clone)]
pub struct Milestone {
    /// Milestone name, e.g. `first-run-wizard-complete`.
    pub name: String,

    /// How to check it.
    pub check: MilestoneCheck,
}

impl Milestone {
    /// Milestone proven by the output of a query.
    ///
    /// The request is forced to [`Idempotency::ReadOnly`](super::Idempotency::ReadOnly).
    pub fn query(
        name: impl Into<String>,
        request: CommandRequest,
        predicate: OutputPredicate,
    ) -> Self {
        Self {
            name: name.into(),
            check: MilestoneCheck::Query {
                request: request.read_only(),
                predicate,
            },
        }
    }

    /// Milestone proven by entering the privileged shell.
    pub fn privileged_reachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: MilestoneCheck::PrivilegedReachable,
        }
    }
}

/// Result of a guarded configuration step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The milestone already held; nothing was sent.
    AlreadySatisfied,
    /// The sequence ran and the milestone was confirmed afterwards.
    Applied(Vec<CommandResponse>),
}

impl StepOutcome {
    /// Whether any command was sent.
    pub fn was_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied(_))
    }

    /// Responses of the applied sequence (empty if skipped).
    pub fn responses(&self) -> &[CommandResponse] {
        match self {
            StepOutcome::AlreadySatisfied => &[],
            StepOutcome::Applied(responses) => responses,
        }
    }
}
