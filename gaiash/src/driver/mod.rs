//! High-level driver for appliance interaction.
//!
//! The driver layer owns the session lifecycle, moves the shell between
//! its restricted and privileged modes, and recovers from dropped
//! connections and stuck commands without resending anything that may
//! already have taken effect.

mod builder;
pub(crate) mod executor;
mod manager;
mod milestone;
mod request;
mod response;
mod retry;
mod session;
mod settings;

pub use builder::DriverBuilder;
pub use manager::ConnectionManager;
pub use milestone::{Milestone, MilestoneCheck, OutputPredicate, StepOutcome};
pub use request::{CommandRequest, FollowUp, Idempotency, OutputCheck};
pub use response::{CommandResponse, Failure, FailureKind};
pub use retry::{Backoff, Outcome, RetryPolicy};
pub use session::Session;
pub use settings::{SessionSettings, Timeouts};

use std::future::Future;

use log::info;
use secrecy::SecretString;

use crate::error::{DriverError, Result};
use crate::platform::ShellMode;

/// Trait for appliance drivers.
///
/// Setup routines are written against this trait so they can run over a
/// real SSH session or a scripted one.
pub trait Driver: Send {
    /// Open the connection to the appliance.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection. Closing twice is not an error.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Run one request, switching mode first if it asks for one.
    fn run_command(
        &mut self,
        request: &CommandRequest,
    ) -> impl Future<Output = Result<CommandResponse>> + Send;

    /// Run requests in order, stopping at the first error.
    ///
    /// A request whose output carries a failure marker is not an error
    /// here; inspect each response.
    fn run_commands(
        &mut self,
        requests: &[CommandRequest],
    ) -> impl Future<Output = Result<Vec<CommandResponse>>> + Send {
        async move {
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(self.run_command(request).await?);
            }
            Ok(responses)
        }
    }

    /// Put the shell in `mode`. A no-op if it is already there.
    fn ensure_mode(
        &mut self,
        mode: ShellMode,
        secret: Option<&SecretString>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check a named milestone against the live appliance.
    fn query_milestone(&mut self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Probe the shell and report its mode.
    fn current_mode(&mut self) -> impl Future<Output = Result<ShellMode>> + Send;

    /// Remember the secret for entering the privileged shell.
    fn set_privileged_secret(&mut self, secret: SecretString);

    /// Check if a session is open.
    fn is_open(&self) -> bool;

    /// Run `requests` unless `milestone` already holds, then confirm it.
    ///
    /// Every request must succeed. If the milestone still does not hold
    /// afterwards the step fails with
    /// [`DriverError::MilestoneNotReached`].
    fn apply_guarded(
        &mut self,
        milestone: &str,
        requests: &[CommandRequest],
    ) -> impl Future<Output = Result<StepOutcome>> + Send {
        async move {
            if self.query_milestone(milestone).await? {
                info!("'{}' already satisfied, skipping", milestone);
                return Ok(StepOutcome::AlreadySatisfied);
            }

            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(self.run_command(request).await?.into_result()?);
            }

            if !self.query_milestone(milestone).await? {
                return Err(DriverError::MilestoneNotReached {
                    milestone: milestone.to_string(),
                }
                .into());
            }
            info!("'{}' reached", milestone);
            Ok(StepOutcome::Applied(responses))
        }
    }
}
