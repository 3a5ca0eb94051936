//! Platform definitions.
//!
//! A platform describes one appliance family: how its prompts look in
//! each shell mode, how to move between modes, which output means a
//! command failed, and which milestones can be queried.

mod definition;
mod shell_mode;
pub mod vendors;

pub use definition::PlatformDefinition;
pub use shell_mode::{ModeSwitch, ShellMode};
