//! Check Point Gaia platform definition.
//!
//! Gaia logs users into `clish`, a restricted command shell. The `expert`
//! command opens a root bash shell after asking for the expert password;
//! `exit` in bash returns to clish.
//!
//! # Prompt Examples
//!
//! ```text
//! gw-01>                    # clish (restricted)
//! [Expert@gw-01:0]#         # expert bash (privileged)
//! ```
//!
//! # Mode Graph
//!
//! ```text
//! ┌────────────┐   expert + password   ┌─────────────────┐
//! │ restricted ├───────────────────────► privileged      │
//! │  host>     │        exit           │ [Expert@host:0]#│
//! └────────────┘◄──────────────────────┴─────────────────┘
//! ```

use regex::bytes::Regex;

use crate::channel::PromptRule;
use crate::driver::{CommandRequest, Milestone, OutputPredicate};
use crate::error::{PlatformError, Result};
use crate::platform::{ModeSwitch, PlatformDefinition};

/// Platform name for Check Point Gaia.
pub const PLATFORM_NAME: &str = "check_point_gaia";

/// The expert password has been defined, proven by entering expert mode.
pub const PRIVILEGED_PASSWORD_SET: &str = "privileged-password-set";

/// The first time configuration wizard has completed.
pub const FIRST_RUN_WIZARD_COMPLETE: &str = "first-run-wizard-complete";

/// Marker file left behind by a completed first time configuration.
const WIZARD_MARKER: &str = "/etc/.wizard_accepted";

/// Create the Check Point Gaia platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let wizard_done = Milestone::query(
        FIRST_RUN_WIZARD_COMPLETE,
        CommandRequest::new(format!(
            "test -f {} && echo present || echo absent",
            WIZARD_MARKER
        ))
        .privileged(),
        OutputPredicate::Matches(Regex::new(r"(?m)^present$").map_err(PlatformError::from)?),
    );

    PlatformDefinition::new(PLATFORM_NAME)
        .with_prompts(vec![
            PromptRule::privileged_bracketed("Expert", b'#'),
            PromptRule::restricted_suffix(b'>'),
        ])
        .with_mode_switch(ModeSwitch::new("expert", "password:", "exit"))
        .with_failure_pattern(r"CLINFR\d+")?
        .with_failure_pattern(r"(?i)\berror:")?
        .with_failure_pattern(r"(?i)\bfailed:")?
        .with_failure_pattern(r"(?i)invalid command")?
        .with_failure_pattern(r"command not found")?
        .with_failure_pattern(r"Permission denied")?
        .with_failure_pattern(r"Access denied")?
        .with_failure_pattern(r"Wrong password")?
        .with_failure_pattern(r"Passwords do not match")
        .map(|platform| {
            platform
                .with_milestone(Milestone::privileged_reachable(PRIVILEGED_PASSWORD_SET))
                .with_milestone(wizard_done)
                .with_terminal_size(511, 24)
        })
}
