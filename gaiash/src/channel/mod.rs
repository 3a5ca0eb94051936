//! Channel layer for prompt matching and PTY reads.
//!
//! This module handles the interactive shell stream, including
//! structural prompt detection and ANSI stripping.

mod buffer;
mod patterns;
mod pty;

pub use buffer::PatternBuffer;
pub use patterns::{PromptMatch, PromptMatcher, PromptPattern, PromptRule, PromptShape, SubPrompt};
pub use pty::{PtyChannel, PtyConfig};
