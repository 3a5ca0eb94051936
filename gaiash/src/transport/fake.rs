//! Scripted in-memory appliances for tests.
//!
//! [`ChunkedShell`] replays a fixed list of chunks. [`FakeAppliance`] is a
//! small Gaia emulator: a restricted shell with `gw> `, an expert shell with
//! `[Expert@gw:0]# `, the expert password dialogs and enough of bash to run
//! the setup steps. State that survives a reboot on a real box (expert
//! password, wizard completion, files) is shared across connections.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::config::SshConfig;
use super::shell::{Connector, ShellIo};
use crate::error::{ChannelError, Result, TransportError};
use crate::platform::ShellMode;

pub(crate) const RESTRICTED_PROMPT: &str = "gw> ";
pub(crate) const PRIVILEGED_PROMPT: &str = "[Expert@gw:0]# ";
pub(crate) const BANNER: &str = "This system is for authorized use only.\r\n";

/// Shell that hands out a fixed list of chunks, then closes or stalls.
pub(crate) struct ChunkedShell {
    chunks: VecDeque<Vec<u8>>,
    stall: bool,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ChunkedShell {
    pub(crate) fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            stall: false,
            written: Arc::default(),
        }
    }

    /// Block forever once the chunks run out instead of reporting EOF.
    pub(crate) fn stall_when_empty(mut self) -> Self {
        self.stall = true;
        self
    }

    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl ShellIo for ChunkedShell {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Ok(mut written) = self.written.lock() {
            written.extend_from_slice(data);
        }
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.stall => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.chunks.clear();
        self.stall = false;
        Ok(())
    }
}

/// One-shot fault triggered by the first line starting with a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Close the connection after reading the line.
    Drop { apply: bool },
    /// Echo the line and then produce nothing until interrupted.
    Stall { apply: bool },
    /// Apply the line, close the connection and refuse the next
    /// `refusals` connection attempts.
    Reboot { refusals: usize },
}

#[derive(Debug)]
pub(crate) struct State {
    pub expert_password: Option<String>,
    pub wizard_done: bool,
    pub files: HashMap<String, String>,
    /// Every line received, across all connections.
    pub sent: Vec<String>,
    pub opens: usize,
    pub refuse_connections: usize,
    pub reject_auth: bool,
    pub chunk_size: Option<usize>,
    faults: Vec<(String, Fault)>,
}

/// Shared handle to an emulated appliance. Cloning shares the state.
#[derive(Clone)]
pub(crate) struct FakeAppliance {
    state: Arc<Mutex<State>>,
}

impl Default for FakeAppliance {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                expert_password: None,
                wizard_done: false,
                files: HashMap::new(),
                sent: Vec::new(),
                opens: 0,
                refuse_connections: 0,
                reject_auth: false,
                chunk_size: None,
                faults: Vec::new(),
            })),
        }
    }
}

impl FakeAppliance {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_expert_password(self, password: &str) -> Self {
        self.state().expert_password = Some(password.to_string());
        self
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn fail_next(&self, prefix: &str, fault: Fault) {
        self.state().faults.push((prefix.to_string(), fault));
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// How many received lines start with `prefix`.
    pub(crate) fn count_sent(&self, prefix: &str) -> usize {
        self.state()
            .sent
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    pub(crate) fn opens(&self) -> usize {
        self.state().opens
    }
}

impl Connector for FakeAppliance {
    type Shell = FakeShell;

    async fn open(&self, config: &SshConfig) -> Result<FakeShell> {
        let mut state = self.state();
        if state.refuse_connections > 0 {
            state.refuse_connections -= 1;
            return Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }
            .into());
        }
        if state.reject_auth {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }
        state.opens += 1;
        drop(state);

        let mut shell = FakeShell {
            appliance: self.clone(),
            input: Vec::new(),
            output: VecDeque::new(),
            mode: ShellMode::Restricted,
            pending: Pending::None,
            closed: false,
        };
        shell.emit(BANNER);
        shell.emit_prompt();
        Ok(shell)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    None,
    ExpertLogin,
    NewPassword,
    ConfirmPassword(String),
    Stalled,
}

/// One emulated login shell.
pub(crate) struct FakeShell {
    appliance: FakeAppliance,
    input: Vec<u8>,
    output: VecDeque<u8>,
    mode: ShellMode,
    pending: Pending,
    closed: bool,
}

impl FakeShell {
    fn emit(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn emit_prompt(&mut self) {
        let prompt = match self.mode {
            ShellMode::Privileged => PRIVILEGED_PROMPT,
            _ => RESTRICTED_PROMPT,
        };
        self.emit(prompt);
    }

    fn interrupt(&mut self) {
        self.input.clear();
        self.pending = Pending::None;
        self.emit("^C\r\n");
        self.emit_prompt();
    }

    fn receive(&mut self, line: String) {
        let fault = {
            let mut state = self.appliance.state();
            state.sent.push(line.clone());
            let idx = state
                .faults
                .iter()
                .position(|(prefix, _)| !prefix.is_empty() && line.starts_with(prefix.as_str()));
            idx.map(|i| state.faults.remove(i).1)
        };

        let hidden = matches!(
            self.pending,
            Pending::ExpertLogin | Pending::NewPassword | Pending::ConfirmPassword(_)
        );
        if hidden {
            self.emit("\r\n");
        } else {
            self.emit(&line);
            self.emit("\r\n");
        }

        match fault {
            Some(Fault::Drop { apply }) => {
                if apply {
                    self.apply_silently(&line);
                }
                self.closed = true;
            }
            Some(Fault::Stall { apply }) => {
                if apply {
                    self.apply_silently(&line);
                }
                self.pending = Pending::Stalled;
            }
            Some(Fault::Reboot { refusals }) => {
                self.apply_silently(&line);
                self.appliance.state().refuse_connections = refusals;
                self.closed = true;
            }
            None => self.handle(&line),
        }
    }

    /// Run a line for its side effects on the shared state only.
    fn apply_silently(&mut self, line: &str) {
        let mut scratch = FakeShell {
            appliance: self.appliance.clone(),
            input: Vec::new(),
            output: VecDeque::new(),
            mode: self.mode,
            pending: self.pending.clone(),
            closed: false,
        };
        scratch.handle(line);
    }

    fn handle(&mut self, line: &str) {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Stalled => {
                self.pending = Pending::Stalled;
                return;
            }
            Pending::ExpertLogin => {
                let expected = self.appliance.state().expert_password.clone();
                if expected.as_deref() == Some(line) {
                    self.emit("\r\nWarning! All configurations should be done through clish\r\n");
                    self.emit("You are in expert mode now.\r\n\r\n");
                    self.mode = ShellMode::Privileged;
                } else {
                    self.emit("Wrong password.\r\n");
                }
                self.emit_prompt();
                return;
            }
            Pending::NewPassword => {
                self.pending = Pending::ConfirmPassword(line.to_string());
                self.emit("Retype new expert password:");
                return;
            }
            Pending::ConfirmPassword(first) => {
                if first == line {
                    self.appliance.state().expert_password = Some(first);
                } else {
                    self.emit("Passwords do not match\r\n");
                }
                self.emit_prompt();
                return;
            }
            Pending::None => {}
        }

        match self.mode {
            ShellMode::Privileged => self.handle_bash(line),
            _ => self.handle_clish(line),
        }
    }

    fn handle_clish(&mut self, line: &str) {
        match line.trim() {
            "" | "lock database override" => {}
            "expert" => {
                if self.appliance.state().expert_password.is_none() {
                    self.emit("Expert password has not been defined. To set expert password, use the command \"set expert-password\".\r\n");
                } else {
                    self.pending = Pending::ExpertLogin;
                    self.emit("Enter expert password:");
                    return;
                }
            }
            "set expert-password" => {
                self.pending = Pending::NewPassword;
                self.emit("Enter new expert password:");
                return;
            }
            "show hostname" => self.emit("gw\r\n"),
            "show version all" => {
                self.emit("Product version Check Point Gaia R81.20\r\n");
                self.emit("OS build 631\r\n");
            }
            "exit" => {
                self.closed = true;
                return;
            }
            other => self.emit(&format!("CLINFR0329  Invalid command:'{}'.\r\n", other)),
        }
        self.emit_prompt();
    }

    fn handle_bash(&mut self, line: &str) {
        let line = line.trim();
        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("exit") => self.mode = ShellMode::Restricted,
            Some("hostname") => self.emit("gw\r\n"),
            Some("test") => {
                let present = self.appliance.state().wizard_done;
                self.emit(if present { "present\r\n" } else { "absent\r\n" });
            }
            Some("printf") => match line.rsplit_once(" > ") {
                Some((body, path)) => {
                    self.appliance
                        .state()
                        .files
                        .insert(path.to_string(), body.to_string());
                }
                None => self.emit(line.trim_start_matches("printf ")),
            },
            Some("config_system") => {
                let dry_run = line.contains("--dry-run");
                let path = line.rsplit(' ').next().unwrap_or_default().to_string();
                let mut state = self.appliance.state();
                if !state.files.contains_key(&path) {
                    drop(state);
                    self.emit(&format!("Failed: configuration file {} not found\r\n", path));
                } else if dry_run {
                    drop(state);
                    self.emit("Validating configuration file: Done\r\n");
                } else {
                    state.wizard_done = true;
                    drop(state);
                    self.emit("Configuring products...\r\nFirst time configuration was completed!\r\n");
                }
            }
            Some("rm") => {
                if let Some(path) = line.rsplit(' ').next() {
                    self.appliance.state().files.remove(path);
                }
            }
            Some(cmd) => self.emit(&format!("bash: {}: command not found\r\n", cmd)),
        }
        self.emit_prompt();
    }
}

impl ShellIo for FakeShell {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ChannelError::ConnectionLost {
                partial: String::new(),
            }
            .into());
        }
        for &byte in data {
            match byte {
                0x03 => self.interrupt(),
                b'\n' => {
                    let raw = std::mem::take(&mut self.input);
                    let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
                    self.receive(line);
                }
                _ => self.input.push(byte),
            }
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.output.is_empty() {
            if self.closed {
                return Ok(None);
            }
            return std::future::pending().await;
        }
        let size = self.appliance.state().chunk_size.unwrap_or(usize::MAX);
        let n = size.min(self.output.len()).max(1);
        Ok(Some(self.output.drain(..n).collect()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.output.clear();
        Ok(())
    }
}
