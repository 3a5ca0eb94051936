//! Builder for creating appliance drivers.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::manager::ConnectionManager;
use super::retry::RetryPolicy;
use super::settings::{SessionSettings, Timeouts};
use crate::error::{DriverError, Result};
use crate::platform::PlatformDefinition;
use crate::platform::vendors::gaia;
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig, SshConnector};

/// Builder for constructing appliance drivers.
///
/// # Example
///
/// ```rust,no_run
/// use gaiash::driver::{Driver, DriverBuilder};
///
/// # async fn example() -> Result<(), gaiash::Error> {
/// let mut driver = DriverBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .privileged_secret("Expert123!")
///     .build()?;
/// driver.open().await?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    privileged_secret: Option<SecretString>,
    platform: Option<PlatformDefinition>,
    timeouts: Timeouts,
    retry: RetryPolicy,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    terminal_size: Option<(u32, u32)>,
}

impl DriverBuilder {
    /// Create a new driver builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            privileged_secret: None,
            platform: None,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            terminal_size: None,
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the secret for entering the privileged shell.
    pub fn privileged_secret(mut self, secret: impl Into<String>) -> Self {
        self.privileged_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Use a custom platform definition instead of the Gaia default.
    pub fn platform(mut self, platform: PlatformDefinition) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set all timeouts at once.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Set the default per-step command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.command = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the host key verification mode (default: AcceptNew).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Set a custom known_hosts file path.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Set terminal dimensions. Defaults to the platform's.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_size = Some((width, height));
        self
    }

    /// Build the driver.
    ///
    /// This creates the driver but does not connect. Call `open()` on the
    /// returned driver to establish the connection.
    pub fn build(self) -> Result<ConnectionManager<SshConnector>> {
        let username = self
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DriverError::InvalidConfig {
                message: "username is required".to_string(),
            })?;

        let platform = match self.platform {
            Some(platform) => platform,
            None => gaia::platform()?,
        };

        let (width, height) = self
            .terminal_size
            .unwrap_or((platform.terminal_width, platform.terminal_height));

        let mut ssh = SshConfig::new(self.host, username, self.auth);
        ssh.port = self.port;
        ssh.timeout = self.timeouts.connect;
        ssh.terminal_width = width;
        ssh.terminal_height = height;
        ssh.host_key_verification = self.host_key_verification;
        ssh.known_hosts_path = self.known_hosts_path;

        let settings = SessionSettings {
            ssh,
            timeouts: self.timeouts,
            retry: self.retry,
            privileged_secret: self.privileged_secret,
        };

        Ok(ConnectionManager::new(SshConnector, settings, platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::platform::ShellMode;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let manager = DriverBuilder::new("10.0.0.1")
            .username("admin")
            .password("admin123")
            .build()
            .unwrap();

        let settings = manager.settings();
        assert_eq!(settings.ssh.socket_addr(), "10.0.0.1:22");
        assert_eq!(settings.ssh.terminal_width, 511);
        assert_eq!(settings.retry, RetryPolicy::default());
        assert!(settings.privileged_secret.is_none());
        assert_eq!(manager.platform().name, "check_point_gaia");
        assert!(manager.session().is_none());
    }

    #[test]
    fn test_overrides() {
        let manager = DriverBuilder::new("gw")
            .port(2222)
            .username("admin")
            .private_key("/home/admin/.ssh/id_ed25519")
            .privileged_secret("Expert123!")
            .timeout(Duration::from_secs(5))
            .command_timeout(Duration::from_secs(600))
            .retry(RetryPolicy::none())
            .host_key_verification(HostKeyVerification::Disabled)
            .terminal_size(200, 50)
            .build()
            .unwrap();

        let settings = manager.settings();
        assert_eq!(settings.ssh.port, 2222);
        assert_eq!(settings.ssh.timeout, Duration::from_secs(5));
        assert_eq!(settings.timeouts.command, Duration::from_secs(600));
        assert_eq!(settings.retry.max_attempts, 1);
        assert_eq!(settings.ssh.terminal_height, 50);
        assert!(matches!(settings.ssh.auth, AuthMethod::PrivateKey { .. }));
        assert!(matches!(
            settings.ssh.host_key_verification,
            HostKeyVerification::Disabled
        ));
        let secret = settings.privileged_secret.as_ref().unwrap();
        assert_eq!(secret.expose_secret(), "Expert123!");
    }

    #[test]
    fn test_username_required() {
        let err = DriverBuilder::new("gw").password("x").build().err().unwrap();
        assert!(matches!(err, Error::Driver(DriverError::InvalidConfig { .. })));

        let err = DriverBuilder::new("gw").username("").build().err().unwrap();
        assert!(matches!(err, Error::Driver(DriverError::InvalidConfig { .. })));
    }

    #[test]
    fn test_custom_platform() {
        let platform = PlatformDefinition::new("lab_gaia")
            .with_on_open_command("set clienv rows 0");
        let manager = DriverBuilder::new("gw")
            .username("admin")
            .platform(platform)
            .build()
            .unwrap();
        assert_eq!(manager.platform().name, "lab_gaia");
        assert_eq!(manager.platform().on_open_commands, vec!["set clienv rows 0"]);
        assert_eq!(
            manager.platform().prompts.classify(b"[Expert@gw:0]# "),
            (ShellMode::Privileged, true)
        );
    }
}
