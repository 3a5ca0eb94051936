//! Idempotent first-boot setup steps for Gaia appliances.
//!
//! Each step checks its milestone on the live appliance first and does
//! nothing if it already holds, so a provisioning run can be repeated
//! after any failure.

use std::time::Duration;

use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use super::platform::{FIRST_RUN_WIZARD_COMPLETE, PRIVILEGED_PASSWORD_SET};
use crate::driver::{CommandRequest, Driver, RetryPolicy, StepOutcome};
use crate::error::{DriverError, Result};

/// Shortest expert password Gaia accepts.
const MIN_SECRET_LEN: usize = 6;

/// How long the first time configuration wizard may run.
pub const WIZARD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Reconnect schedule while the appliance reboots after the wizard:
/// about 25 minutes in total.
pub fn reboot_policy() -> RetryPolicy {
    RetryPolicy::new(30, Duration::from_secs(10), 1.5, Duration::from_secs(60))
}

/// Define the expert password, unless the privileged shell can already be
/// entered with it.
///
/// The secret is also remembered by the driver for later mode switches.
pub async fn set_privileged_password<D: Driver>(
    driver: &mut D,
    secret: &SecretString,
) -> Result<StepOutcome> {
    let length = secret.expose_secret().chars().count();
    if length < MIN_SECRET_LEN {
        return Err(DriverError::InvalidConfig {
            message: format!(
                "expert password must be at least {} characters, got {}",
                MIN_SECRET_LEN, length
            ),
        }
        .into());
    }

    driver.set_privileged_secret(secret.clone());

    let steps = [
        CommandRequest::new("lock database override")
            .restricted()
            .read_only(),
        CommandRequest::new("set expert-password")
            .restricted()
            .hidden_follow_up("new expert password:", secret.expose_secret())
            .hidden_follow_up("password:", secret.expose_secret())
            .guarded_by(PRIVILEGED_PASSWORD_SET),
    ];

    let outcome = driver.apply_guarded(PRIVILEGED_PASSWORD_SET, &steps).await?;
    if outcome.was_applied() {
        info!("expert password defined");
    }
    Ok(outcome)
}

/// Run the first time configuration wizard from a generated config file.
///
/// The file is written from the privileged shell, validated with a dry run,
/// applied unless the wizard has already completed, and removed again.
/// The file contents never appear in logs or errors. If the wizard reboots
/// the appliance the driver waits for it under [`reboot_policy`] and checks
/// the milestone instead of running the wizard again.
pub async fn apply_config_file<D: Driver>(
    driver: &mut D,
    path: &str,
    contents: &str,
) -> Result<StepOutcome> {
    let unsafe_char = |c: char| c.is_whitespace() || "'\"`$;&|<>".contains(c);
    if !path.starts_with('/') || path.contains(unsafe_char) {
        return Err(DriverError::InvalidConfig {
            message: format!("unsupported config file path: {:?}", path),
        }
        .into());
    }

    debug!("writing {} ({} bytes)", path, contents.len());
    driver
        .run_command(&write_file_request(path, contents))
        .await?
        .into_result()?;

    driver
        .run_command(
            &CommandRequest::query(format!("config_system --dry-run -f {}", path)).privileged(),
        )
        .await?
        .into_result()?;

    let apply = [wizard_request(path)];
    let outcome = driver.apply_guarded(FIRST_RUN_WIZARD_COMPLETE, &apply).await;

    let cleanup = driver
        .run_command(
            &CommandRequest::query(format!("rm -f {}", path))
                .privileged()
                .reconnect_policy(reboot_policy()),
        )
        .await;

    match (outcome, cleanup) {
        (Ok(outcome), cleanup) => {
            cleanup?.into_result()?;
            Ok(outcome)
        }
        (Err(e), cleanup) => {
            if let Err(cleanup_err) = cleanup {
                debug!("could not remove {}: {}", path, cleanup_err);
            }
            Err(e)
        }
    }
}

/// The wizard run itself. Guarded, so a reboot or timeout never leads to a
/// second run once the wizard has completed.
fn wizard_request(path: &str) -> CommandRequest {
    CommandRequest::new(format!("config_system -f {}", path))
        .privileged()
        .timeout(WIZARD_TIMEOUT)
        .reconnect_policy(reboot_policy())
        .guarded_by(FIRST_RUN_WIZARD_COMPLETE)
}

/// Privileged request writing `contents` to `path`, labelled so the
/// contents stay out of logs and errors.
fn write_file_request(path: &str, contents: &str) -> CommandRequest {
    CommandRequest::new(write_file_command(path, contents))
        .privileged()
        .label(format!("printf ... > {} ({} bytes)", path, contents.len()))
}

/// Single-line shell command that writes `contents` to `path`.
fn write_file_command(path: &str, contents: &str) -> String {
    let escaped = contents
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\'', "'\\''");
    format!("printf '%b' '{}' > {}", escaped, path)
}
