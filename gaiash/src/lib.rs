//! # gaiash
//!
//! Async SSH session core for Check Point Gaia appliances.
//!
//! gaiash drives the interactive shells of a Gaia appliance over SSH: the
//! restricted `clish` shell (`gw>`) and the privileged expert shell
//! (`[Expert@gw:0]#`). It is the layer provisioning code sends its commands
//! through.
//!
//! ## Features
//!
//! - Async SSH connections via russh, with host key policies
//! - Prompt recognition by shape, privileged prompts first
//! - Interactive commands with hidden password follow-ups
//! - Mode switching confirmed by the prompt, never assumed
//! - Bounded exponential backoff for transient failures
//! - Reconnect and interrupt recovery that never resends a command which
//!   may already have taken effect
//! - Named milestones for idempotent setup steps
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gaiash::{CommandRequest, Driver, DriverBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gaiash::Error> {
//!     let mut driver = DriverBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .privileged_secret("Expert123!")
//!         .build()?;
//!
//!     driver.open().await?;
//!
//!     let response = driver
//!         .run_command(&CommandRequest::query("show version all"))
//!         .await?;
//!     println!("{}", response.output);
//!
//!     let response = driver
//!         .run_command(&CommandRequest::query("cpinfo -y all").privileged())
//!         .await?;
//!     println!("{}", response.output);
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use driver::{
    CommandRequest, CommandResponse, ConnectionManager, Driver, DriverBuilder, Idempotency,
    RetryPolicy, SessionSettings, StepOutcome,
};
pub use error::{Error, ErrorKind};
pub use platform::{PlatformDefinition, ShellMode};
pub use transport::{AuthMethod, SshConfig};
