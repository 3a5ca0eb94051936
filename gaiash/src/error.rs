//! Error types for gaiash.
//!
//! Errors are layered the same way the crate is: transport (SSH connection
//! and authentication), channel (raw reads from the shell), driver (command
//! protocol and mode handling) and platform (vendor definitions).
//!
//! Every layer maps onto a single [`ErrorKind`], which is what the retry
//! policy and callers use to decide what to do next.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::platform::ShellMode;

/// Main error type for gaiash operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// The server presented a key that differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict verification is on and the host is not in known_hosts
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (raw reads and writes on the shell).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel closed or failed underneath a read or write.
    #[error("Connection lost ({} bytes of output captured)", partial.len())]
    ConnectionLost { partial: String },

    /// Nothing matching the read predicate arrived before the deadline.
    #[error("No prompt within {waited:?}")]
    ReadTimeout { waited: Duration, partial: String },

    /// Read or write attempted on a channel that was already closed.
    #[error("Channel is not open")]
    NotOpen,
}

/// Which part of a command exchange a timeout happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStep {
    /// Waiting for the sub-prompt of the follow-up at this index.
    FollowUp(usize),
    /// Waiting for the shell prompt after the command (and follow-ups).
    Prompt,
    /// Zero-content probe used to read the current mode.
    Probe,
}

impl std::fmt::Display for CommandStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStep::FollowUp(i) => write!(f, "follow-up #{}", i + 1),
            CommandStep::Prompt => write!(f, "prompt"),
            CommandStep::Probe => write!(f, "probe"),
        }
    }
}

/// Driver layer errors (command execution, mode switching).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not connected - call open() first")]
    NotConnected,

    /// Driver already connected
    #[error("Driver already connected")]
    AlreadyConnected,

    /// A step of a command exceeded its timeout.
    #[error("Command '{command}' timed out at {step} after {waited:?}")]
    CommandTimeout {
        command: String,
        step: CommandStep,
        waited: Duration,
        partial: String,
    },

    /// Command execution failed
    #[error("Command '{command}' failed after {elapsed:?}: {message}")]
    CommandFailed {
        command: String,
        message: String,
        output: String,
        elapsed: Duration,
    },

    /// The shell did not end up in the requested mode.
    #[error("Failed to enter {target} mode after {elapsed:?} (observed {observed})")]
    ModeTransitionFailed {
        target: ShellMode,
        observed: ShellMode,
        output: String,
        elapsed: Duration,
    },

    /// The connection dropped after a state-changing command was sent.
    #[error(
        "Outcome of '{command}' is unknown after {elapsed:?}: connection dropped or stalled after it was sent"
    )]
    AmbiguousOutcome {
        command: String,
        partial: String,
        elapsed: Duration,
    },

    /// A guarded step ran but the milestone still does not hold.
    #[error("Milestone '{milestone}' not reached after applying its step")]
    MilestoneNotReached { milestone: String },

    /// No milestone with this name is defined for the platform.
    #[error("Unknown milestone '{name}'")]
    UnknownMilestone { name: String },

    /// Entering a mode needs a secret and none was supplied or remembered.
    #[error("A secret is required to enter {target} mode")]
    SecretRequired { target: ShellMode },

    /// Invalid configuration in the driver builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },

    /// Invalid regex pattern in a definition
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Failure taxonomy shared by every error in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials were rejected.
    Authentication,
    /// The connection could not be established.
    Connection,
    /// An established channel dropped.
    ConnectionLost,
    /// A read deadline elapsed.
    CommandTimeout,
    /// The shell refused to change mode.
    ModeTransition,
    /// The appliance reported an error for a command.
    Command,
    /// A state-changing command may or may not have been applied.
    AmbiguousOutcome,
    /// Programming or configuration error on the caller side.
    Configuration,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(e) => match e {
                TransportError::AuthenticationFailed { .. } => ErrorKind::Authentication,
                TransportError::Key(_)
                | TransportError::HostKeyChanged { .. }
                | TransportError::HostKeyUnknown { .. }
                | TransportError::KnownHosts(_) => ErrorKind::Configuration,
                TransportError::Timeout(_)
                | TransportError::ConnectionFailed { .. }
                | TransportError::Ssh(_)
                | TransportError::Io(_) => ErrorKind::Connection,
            },
            Error::Channel(e) => match e {
                ChannelError::ReadTimeout { .. } => ErrorKind::CommandTimeout,
                ChannelError::ConnectionLost { .. } | ChannelError::NotOpen => {
                    ErrorKind::ConnectionLost
                }
            },
            Error::Driver(e) => match e {
                DriverError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
                DriverError::CommandFailed { .. } => ErrorKind::Command,
                DriverError::ModeTransitionFailed { .. } => ErrorKind::ModeTransition,
                DriverError::AmbiguousOutcome { .. } => ErrorKind::AmbiguousOutcome,
                DriverError::NotConnected => ErrorKind::ConnectionLost,
                DriverError::AlreadyConnected
                | DriverError::MilestoneNotReached { .. }
                | DriverError::UnknownMilestone { .. }
                | DriverError::SecretRequired { .. }
                | DriverError::InvalidConfig { .. } => ErrorKind::Configuration,
            },
            Error::Platform(_) => ErrorKind::Configuration,
        }
    }

    /// Whether retrying the operation can help.
    ///
    /// Connection problems and timeouts are transient; authentication,
    /// command and mode failures are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::ConnectionLost | ErrorKind::CommandTimeout
        )
    }

    /// Whether the channel underneath the session is gone.
    pub fn is_connection_lost(&self) -> bool {
        self.kind() == ErrorKind::ConnectionLost
    }

    /// Output captured before the failure, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Error::Channel(ChannelError::ConnectionLost { partial })
            | Error::Channel(ChannelError::ReadTimeout { partial, .. })
            | Error::Driver(DriverError::CommandTimeout { partial, .. })
            | Error::Driver(DriverError::AmbiguousOutcome { partial, .. }) => Some(partial),
            Error::Driver(DriverError::CommandFailed { output, .. })
            | Error::Driver(DriverError::ModeTransitionFailed { output, .. }) => Some(output),
            _ => None,
        }
    }

    /// Time spent before a terminal command or mode failure.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Error::Driver(DriverError::CommandFailed { elapsed, .. })
            | Error::Driver(DriverError::ModeTransitionFailed { elapsed, .. })
            | Error::Driver(DriverError::AmbiguousOutcome { elapsed, .. }) => Some(*elapsed),
            Error::Driver(DriverError::CommandTimeout { waited, .. }) => Some(*waited),
            _ => None,
        }
    }
}

/// Result type alias using gaiash's Error.
pub type Result<T> = std::result::Result<T, Error>;
