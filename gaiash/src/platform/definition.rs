//! Platform definition for vendor-specific configuration.

use indexmap::IndexMap;
use regex::bytes::Regex;

use super::shell_mode::ModeSwitch;
use crate::channel::{PromptMatcher, PromptRule};
use crate::driver::Milestone;
use crate::error::{PlatformError, Result};

/// Everything the session core needs to know about one appliance family.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "checkpoint_gaia").
    pub name: String,

    /// Prompt rules for every shell mode.
    pub prompts: PromptMatcher,

    /// Patterns that mark command output as failed.
    pub failure_markers: Vec<Regex>,

    /// Commands that move between the shells.
    pub mode_switch: ModeSwitch,

    /// Bytes sent to abandon a stuck command.
    pub interrupt: Vec<u8>,

    /// Commands to run when a session is established.
    pub on_open_commands: Vec<String>,

    /// Named milestones, in definition order.
    pub milestones: IndexMap<String, Milestone>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a new platform definition with default prompts and switch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompts: PromptMatcher::default(),
            failure_markers: vec![],
            mode_switch: ModeSwitch::default(),
            interrupt: vec![0x03],
            on_open_commands: vec![],
            milestones: IndexMap::new(),
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Replace the prompt rules.
    pub fn with_prompts(mut self, rules: Vec<PromptRule>) -> Self {
        self.prompts = PromptMatcher::new(rules);
        self
    }

    /// Add a failure marker.
    pub fn with_failure_pattern(mut self, pattern: &str) -> Result<Self> {
        self.failure_markers.push(Regex::new(pattern).map_err(PlatformError::from)?);
        Ok(self)
    }

    /// Set the mode switch commands.
    pub fn with_mode_switch(mut self, mode_switch: ModeSwitch) -> Self {
        self.mode_switch = mode_switch;
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Add a milestone.
    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestones.insert(milestone.name.clone(), milestone);
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Get a milestone by name.
    pub fn milestone(&self, name: &str) -> Option<&Milestone> {
        self.milestones.get(name)
    }

    /// The first output line carrying a failure marker, if any.
    pub fn detect_failure<'a>(&self, output: &'a str, extra: &[Regex]) -> Option<&'a str> {
        self.failure_markers
            .iter()
            .chain(extra)
            .find_map(|marker| marker.find(output.as_bytes()))
            .map(|m| {
                let start = output[..m.start()].rfind('\n').map_or(0, |i| i + 1);
                let end = output[m.end()..].find('\n').map_or(output.len(), |i| m.end() + i);
                output[start..end].trim()
            })
    }
}
