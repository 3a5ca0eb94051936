//! Check Point Gaia platform support.

mod platform;
pub mod setup;

pub use platform::{platform, FIRST_RUN_WIZARD_COMPLETE, PLATFORM_NAME, PRIVILEGED_PASSWORD_SET};
pub use setup::{apply_config_file, set_privileged_password};
