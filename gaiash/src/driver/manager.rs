//! Connection manager: session lifecycle, mode switching, reconnects and
//! the retrying command entry point.

use std::time::Duration;

use log::{debug, info, trace, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::executor;
use super::milestone::MilestoneCheck;
use super::request::{CommandRequest, Idempotency};
use super::response::CommandResponse;
use super::retry::{Outcome, RetryPolicy};
use super::session::Session;
use super::settings::SessionSettings;
use super::Driver;
use crate::channel::{PromptPattern, PtyChannel, PtyConfig};
use crate::error::{ChannelError, DriverError, Error, ErrorKind, Result, TransportError};
use crate::platform::{PlatformDefinition, ShellMode};
use crate::transport::{Connector, SshConfig, SshConnector};

/// Owns at most one [`Session`] and everything needed to rebuild it.
///
/// Commands are strictly sequential: every method takes `&mut self`, so a
/// session can never be driven by two callers at once, and a reconnect can
/// only be started by the owner.
pub struct ConnectionManager<C: Connector = SshConnector> {
    connector: C,
    settings: SessionSettings,
    platform: PlatformDefinition,
    session: Option<Session<C::Shell>>,
    privileged_secret: Option<SecretString>,
    /// Mode to restore, set by a reconnect that has not finished yet.
    restore_mode: Option<ShellMode>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. Nothing is connected until [`connect`](Self::connect).
    pub fn new(connector: C, settings: SessionSettings, platform: PlatformDefinition) -> Self {
        let privileged_secret = settings.privileged_secret.clone();
        Self {
            connector,
            settings,
            platform,
            session: None,
            privileged_secret,
            restore_mode: None,
        }
    }

    /// The settings this manager was built with.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The platform definition.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<&Session<C::Shell>> {
        self.session.as_ref()
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Replace the secret used to enter the privileged shell.
    pub fn set_privileged_secret(&mut self, secret: SecretString) {
        self.privileged_secret = Some(secret);
    }

    /// Connect and authenticate, retrying transient transport failures
    /// under the session's retry policy.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        let timeout = self.settings.timeouts.connect;
        let connector = &self.connector;
        let ssh = &self.settings.ssh;
        let shell = self
            .settings
            .retry
            .run(|attempt| {
                if attempt > 0 {
                    debug!("connect attempt {} to {}", attempt + 1, ssh.socket_addr());
                }
                let open = open_shell(connector, ssh, timeout);
                async move { Outcome::from(open.await) }
            })
            .await?;

        self.restore_mode = None;
        self.start_session(shell).await
    }

    /// Close the session. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.restore_mode = None;
        if let Some(mut session) = self.session.take() {
            info!("disconnecting from {}", session.target());
            session.channel.close().await?;
        }
        Ok(())
    }

    /// Tear down the current session and connect again once, restoring
    /// the privileged shell if that is where the old session was.
    ///
    /// The mode to restore is taken from the last fully established
    /// session; a session left half-built by a failed reconnect does not
    /// replace it.
    pub async fn reconnect(&mut self) -> Result<()> {
        if let Some(mut old) = self.session.take() {
            if self.restore_mode.is_none() && old.mode().is_known() {
                self.restore_mode = Some(old.mode());
            }
            if let Err(e) = old.channel.close().await {
                debug!("closing dead session: {}", e);
            }
        }

        info!("reconnecting to {}", self.settings.ssh.socket_addr());
        let shell =
            open_shell(&self.connector, &self.settings.ssh, self.settings.timeouts.connect).await?;
        self.start_session(shell).await?;

        if self.restore_mode == Some(ShellMode::Privileged) {
            debug!("restoring privileged shell after reconnect");
            self.switch_mode(ShellMode::Privileged, None).await?;
        }
        self.restore_mode = None;
        Ok(())
    }

    /// Keep reconnecting under `policy` until a session is up, e.g. while
    /// the appliance reboots.
    pub async fn wait_for_reconnect(&mut self, policy: &RetryPolicy) -> Result<()> {
        let mut backoff = policy.backoff();
        loop {
            let err = match self.reconnect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };
            match backoff.next() {
                Some(delay) => {
                    warn!("reconnect failed: {}; retrying in {:?}", err, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }

    /// Probe the shell with a bare newline and classify the prompt.
    pub async fn current_mode(&mut self) -> Result<ShellMode> {
        let timeout = self.settings.timeouts.probe;
        let session = self.session.as_mut().ok_or(DriverError::NotConnected)?;
        let (mode, prompt) =
            executor::probe(&mut session.channel, &self.platform.prompts, timeout).await?;
        trace!("probe: {} ({})", mode, prompt);
        session.observe_prompt(mode, prompt);
        Ok(mode)
    }

    /// Move the shell into `target`, confirming by probe.
    ///
    /// A no-op (apart from the probe) if the shell is already there. The
    /// secret defaults to the one remembered from settings or a previous
    /// switch, and is always sent as a hidden follow-up.
    pub async fn switch_mode(
        &mut self,
        target: ShellMode,
        secret: Option<&SecretString>,
    ) -> Result<()> {
        let start = Instant::now();
        if !target.is_known() {
            return Err(DriverError::InvalidConfig {
                message: "cannot switch to an unknown mode".to_string(),
            }
            .into());
        }

        let current = self.current_mode().await?;
        if current == target {
            debug!("already in {} mode", target);
            return Ok(());
        }

        let switch = &self.platform.mode_switch;
        let (request, secret) = match target {
            ShellMode::Privileged => {
                let secret = secret
                    .cloned()
                    .or_else(|| self.privileged_secret.clone())
                    .ok_or(DriverError::SecretRequired { target })?;
                let request = CommandRequest::new(switch.escalate_command.as_str())
                    .hidden_follow_up(&switch.secret_prompt, secret.expose_secret());
                (request, Some(secret))
            }
            _ => (CommandRequest::new(switch.deescalate_command.as_str()), None),
        };

        info!("switching from {} to {} mode", current, target);
        let output = match self.exchange(&request).await {
            Ok(response) => response.output,
            Err(e) if e.kind() == ErrorKind::Command => {
                e.partial_output().unwrap_or_default().to_string()
            }
            Err(e) => return Err(e),
        };

        let observed = self.current_mode().await?;
        if observed != target {
            warn!("mode switch to {} failed, shell is {}", target, observed);
            return Err(DriverError::ModeTransitionFailed {
                target,
                observed,
                output,
                elapsed: start.elapsed(),
            }
            .into());
        }

        if let Some(secret) = secret {
            self.privileged_secret = Some(secret);
        }
        Ok(())
    }

    /// Interrupt whatever the shell is doing and wait for its prompt.
    pub async fn resync(&mut self) -> Result<ShellMode> {
        let timeout = self.settings.timeouts.probe;
        let session = self.session.as_mut().ok_or(DriverError::NotConnected)?;
        debug!("interrupting shell on {}", session.target());
        session.channel.clear_buffer();
        let (mode, prompt) =
            executor::interrupt(&mut session.channel, &self.platform, timeout).await?;
        session.observe_prompt(mode, prompt);
        Ok(mode)
    }

    /// Run one request once: switch mode if needed, then exchange.
    pub async fn execute(&mut self, request: &CommandRequest) -> Result<CommandResponse> {
        self.prepare(request).await?;
        self.exchange(request).await
    }

    /// Run one request, recovering from transient failures.
    ///
    /// A dropped connection triggers exactly one (possibly repeated under
    /// the request's reconnect policy, or the session's retry policy)
    /// reconnect; a timeout triggers an interrupt. Either
    /// way, a request that may already have reached the appliance is only
    /// resent if its [`Idempotency`] allows it.
    pub async fn run_command(&mut self, request: &CommandRequest) -> Result<CommandResponse> {
        if self.session.is_none() {
            return Err(DriverError::NotConnected.into());
        }

        let start = Instant::now();
        let policy = self.settings.retry.clone();
        let reconnect_policy = request.reconnect.as_ref().unwrap_or(&policy);
        let mut backoff = policy.backoff();
        let mut reconnected = false;

        loop {
            let (err, sent) = match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };
            if !err.is_transient() {
                return Err(err);
            }

            if err.is_connection_lost() {
                if reconnected {
                    return Err(err);
                }
                reconnected = true;
                warn!("connection lost during '{}', reconnecting", request.display());
                self.wait_for_reconnect(reconnect_policy).await?;
            } else if err.kind() == ErrorKind::CommandTimeout {
                warn!("'{}' timed out, interrupting", request.display());
                if let Err(resync_err) = self.resync().await {
                    if reconnected {
                        return Err(resync_err);
                    }
                    reconnected = true;
                    debug!("resync failed ({}), reconnecting", resync_err);
                    self.wait_for_reconnect(reconnect_policy).await?;
                }
            }

            if sent {
                match &request.idempotency {
                    Idempotency::ReadOnly => {}
                    Idempotency::Guarded(milestone) => {
                        if self.query_milestone(milestone).await? {
                            info!(
                                "'{}' already took effect ('{}' holds), not resending",
                                request.display(),
                                milestone
                            );
                            let mode = self.session.as_ref().map_or(ShellMode::Unknown, |s| s.mode());
                            return Ok(CommandResponse::already_applied(
                                request.display(),
                                mode,
                                start.elapsed(),
                            ));
                        }
                    }
                    Idempotency::Unsafe => {
                        return Err(DriverError::AmbiguousOutcome {
                            command: request.display().to_string(),
                            partial: err.partial_output().unwrap_or_default().to_string(),
                            elapsed: start.elapsed(),
                        }
                        .into());
                    }
                }
            }

            match backoff.next() {
                Some(delay) => {
                    debug!("retrying '{}' in {:?}", request.display(), delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }

    /// Check a named milestone against the live appliance.
    pub async fn query_milestone(&mut self, name: &str) -> Result<bool> {
        let milestone = self
            .platform
            .milestone(name)
            .cloned()
            .ok_or_else(|| DriverError::UnknownMilestone {
                name: name.to_string(),
            })?;

        let holds = match milestone.check {
            MilestoneCheck::Query { request, predicate } => {
                let response = self.execute(&request).await?.into_result()?;
                predicate.holds(&response.output)
            }
            MilestoneCheck::PrivilegedReachable => self.privileged_reachable().await?,
        };
        debug!(
            "milestone '{}' {}",
            name,
            if holds { "holds" } else { "does not hold" }
        );
        Ok(holds)
    }

    async fn privileged_reachable(&mut self) -> Result<bool> {
        let start_mode = self.current_mode().await?;
        if start_mode == ShellMode::Privileged {
            return Ok(true);
        }
        if self.privileged_secret.is_none() {
            return Ok(false);
        }
        match self.switch_mode(ShellMode::Privileged, None).await {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::ModeTransition | ErrorKind::Command) => {
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        self.switch_mode(start_mode, None).await?;
        Ok(true)
    }

    /// One try. The flag tells whether the command line may have been sent.
    async fn attempt(
        &mut self,
        request: &CommandRequest,
    ) -> std::result::Result<CommandResponse, (Error, bool)> {
        match &self.session {
            None => return Err((DriverError::NotConnected.into(), false)),
            Some(session) if !session.is_alive() => {
                let lost = ChannelError::ConnectionLost {
                    partial: String::new(),
                };
                return Err((lost.into(), false));
            }
            Some(_) => {}
        }
        self.prepare(request).await.map_err(|e| (e, false))?;
        self.exchange(request).await.map_err(|e| (e, true))
    }

    async fn prepare(&mut self, request: &CommandRequest) -> Result<()> {
        let current = self
            .session
            .as_ref()
            .ok_or(DriverError::NotConnected)?
            .mode();
        match request.mode {
            Some(mode) if mode != current => self.switch_mode(mode, None).await,
            _ => Ok(()),
        }
    }

    async fn exchange(&mut self, request: &CommandRequest) -> Result<CommandResponse> {
        let timeout = self.settings.timeouts.command;
        let session = self.session.as_mut().ok_or(DriverError::NotConnected)?;
        let response =
            executor::execute(&mut session.channel, &self.platform, request, timeout).await?;
        session.observe_prompt(response.mode, response.prompt.clone());
        Ok(response)
    }

    /// Read the login banner up to the first prompt and install the session.
    async fn start_session(&mut self, shell: C::Shell) -> Result<()> {
        let timeout = self.settings.timeouts.connect;
        let prompts = &self.platform.prompts;
        let mut channel = PtyChannel::new(shell, PtyConfig::default());

        let data = match channel
            .read_until(|buffer| prompts.is_match(buffer.tail().1), timeout)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    debug!("closing half-open session: {}", close_err);
                }
                return Err(match e {
                    Error::Channel(ChannelError::ReadTimeout { .. }) => {
                        TransportError::Timeout(timeout).into()
                    }
                    other => other,
                });
            }
        };

        let (mode, prompt, before) = executor::split_prompt(prompts, &data);
        let banner = before.replace('\r', "").trim().to_string();
        let ssh = &self.settings.ssh;
        info!(
            "connected to {} as {} ({} shell)",
            ssh.socket_addr(),
            ssh.username,
            mode
        );

        self.session = Some(Session::new(
            ssh.socket_addr(),
            ssh.username.clone(),
            channel,
            mode,
            prompt,
            banner,
        ));

        for command in self.platform.on_open_commands.clone() {
            self.execute(&CommandRequest::query(command)).await?.into_result()?;
        }
        Ok(())
    }
}

async fn open_shell<C: Connector>(connector: &C, ssh: &SshConfig, timeout: Duration) -> Result<C::Shell> {
    match tokio::time::timeout(timeout, connector.open(ssh)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout).into()),
    }
}

impl<C: Connector> Driver for ConnectionManager<C> {
    async fn open(&mut self) -> Result<()> {
        self.connect().await
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect().await
    }

    async fn run_command(&mut self, request: &CommandRequest) -> Result<CommandResponse> {
        Self::run_command(self, request).await
    }

    async fn ensure_mode(&mut self, mode: ShellMode, secret: Option<&SecretString>) -> Result<()> {
        if self.session.is_none() {
            return Err(DriverError::NotConnected.into());
        }
        let policy = self.settings.retry.clone();
        let mut backoff = policy.backoff();
        loop {
            let err = match self.switch_mode(mode, secret).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };
            if err.is_connection_lost() {
                self.wait_for_reconnect(&policy).await?;
            } else if let Err(resync_err) = self.resync().await {
                debug!("resync failed ({}), reconnecting", resync_err);
                self.wait_for_reconnect(&policy).await?;
            }
            match backoff.next() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            }
        }
    }

    async fn query_milestone(&mut self, name: &str) -> Result<bool> {
        Self::query_milestone(self, name).await
    }

    async fn current_mode(&mut self) -> Result<ShellMode> {
        Self::current_mode(self).await
    }

    fn set_privileged_secret(&mut self, secret: SecretString) {
        Self::set_privileged_secret(self, secret)
    }

    fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_alive())
    }
}
