//! Prompt classification and sub-prompt matching.
//!
//! Prompts are recognised structurally instead of with one regex per mode.
//! The matcher looks only at the last line of the buffer (after trailing
//! whitespace is dropped) and runs an ordered list of [`PromptRule`]s over
//! it. Privileged rules are always tried before restricted ones, so text
//! that satisfies both is classified as [`ShellMode::Privileged`].
//!
//! The matcher is meant to be called on a growing buffer after every chunk:
//! a prompt split across two reads simply does not match until the second
//! half has arrived.

use memchr::{memmem, memrchr, memrchr2};
use regex::bytes::Regex;

use crate::platform::ShellMode;

/// Anything that can tell whether the tail of a buffer is waiting for input.
pub trait PromptPattern: Send + Sync {
    /// Returns the byte offset where the match starts, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

/// Regex-based matching, for callers that need more than a fragment.
impl PromptPattern for Regex {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find(data).map(|m| m.start())
    }
}

/// Split off the last non-blank line of `data`.
///
/// Returns the offset of the line within `data` and the line itself with
/// trailing whitespace removed.
pub(crate) fn last_line(data: &[u8]) -> Option<(usize, &[u8])> {
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    let trimmed = &data[..end];
    let start = memrchr2(b'\n', b'\r', trimmed).map_or(0, |i| i + 1);
    Some((start, &trimmed[start..]))
}

/// The structural shape of a shell prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptShape {
    /// `[<tag>@<host>:<digits>]<terminator>`, e.g. `[Expert@gw:0]#`.
    ///
    /// The tag is compared case-insensitively.
    Bracketed { tag: String, terminator: u8 },

    /// `<host>[:<digits>]<terminator>`, e.g. `gw>` or `gw-01:0>`.
    ///
    /// The host is made of letters, digits, `.`, `_` and `-`.
    HostSuffix { terminator: u8 },
}

impl PromptShape {
    /// Offset within `line` where the prompt begins, if the line is one.
    fn locate(&self, line: &[u8]) -> Option<usize> {
        match self {
            PromptShape::Bracketed { tag, terminator } => {
                let len = line.len();
                if len < 2 || line[len - 1] != *terminator || line[len - 2] != b']' {
                    return None;
                }
                let open = memrchr(b'[', &line[..len - 2])?;
                let inner = &line[open + 1..len - 2];
                let tag = tag.as_bytes();
                if inner.len() <= tag.len()
                    || !inner[..tag.len()].eq_ignore_ascii_case(tag)
                    || inner[tag.len()] != b'@'
                {
                    return None;
                }
                let rest = &inner[tag.len() + 1..];
                let colon = memrchr(b':', rest)?;
                let (host, index) = (&rest[..colon], &rest[colon + 1..]);
                if host.is_empty() || index.is_empty() || !index.iter().all(u8::is_ascii_digit) {
                    return None;
                }
                Some(open)
            }
            PromptShape::HostSuffix { terminator } => {
                let (last, token) = line.split_last()?;
                if last != terminator {
                    return None;
                }
                let host = match memrchr(b':', token) {
                    Some(colon) => {
                        let index = &token[colon + 1..];
                        if index.is_empty() || !index.iter().all(u8::is_ascii_digit) {
                            return None;
                        }
                        &token[..colon]
                    }
                    None => token,
                };
                is_host_name(host).then_some(0)
            }
        }
    }
}

/// Letters, digits, `.`, `_` and `-`, starting and ending alphanumeric.
fn is_host_name(name: &[u8]) -> bool {
    let (Some(first), Some(last)) = (name.first(), name.last()) else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && name
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// One prompt rule: a shape and the mode it proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRule {
    /// Mode proven by a prompt of this shape.
    pub mode: ShellMode,

    /// Shape the last line must have.
    pub shape: PromptShape,
}

impl PromptRule {
    /// Bracketed prompt proving the privileged shell.
    pub fn privileged_bracketed(tag: impl Into<String>, terminator: u8) -> Self {
        Self {
            mode: ShellMode::Privileged,
            shape: PromptShape::Bracketed {
                tag: tag.into(),
                terminator,
            },
        }
    }

    /// `host<terminator>` prompt proving the restricted shell.
    pub fn restricted_suffix(terminator: u8) -> Self {
        Self {
            mode: ShellMode::Restricted,
            shape: PromptShape::HostSuffix { terminator },
        }
    }
}

/// A recognised prompt at the end of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch {
    /// Mode the prompt belongs to.
    pub mode: ShellMode,

    /// Byte offset of the prompt within the searched data.
    pub start: usize,

    /// The prompt text, trailing whitespace removed.
    pub text: String,
}

/// Ordered set of prompt rules.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    rules: Vec<PromptRule>,
}

impl PromptMatcher {
    /// Build a matcher. Privileged rules are moved ahead of the others;
    /// relative order is otherwise kept.
    pub fn new(mut rules: Vec<PromptRule>) -> Self {
        rules.sort_by_key(|r| r.mode != ShellMode::Privileged);
        Self { rules }
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[PromptRule] {
        &self.rules
    }

    /// Find a prompt at the end of `data`.
    pub fn find(&self, data: &[u8]) -> Option<PromptMatch> {
        let (line_start, line) = last_line(data)?;
        self.rules.iter().find_map(|rule| {
            rule.shape.locate(line).map(|offset| PromptMatch {
                mode: rule.mode,
                start: line_start + offset,
                text: String::from_utf8_lossy(&line[offset..]).into_owned(),
            })
        })
    }

    /// Classify `data`: the mode and whether a prompt was found at all.
    pub fn classify(&self, data: &[u8]) -> (ShellMode, bool) {
        match self.find(data) {
            Some(m) => (m.mode, true),
            None => (ShellMode::Unknown, false),
        }
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self::new(vec![
            PromptRule::privileged_bracketed("Expert", b'#'),
            PromptRule::restricted_suffix(b'>'),
        ])
    }
}

impl PromptPattern for PromptMatcher {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find(data).map(|m| m.start)
    }
}

/// What a mid-command sub-prompt looks like (e.g. `New password:`).
#[derive(Debug, Clone)]
pub enum SubPrompt {
    /// Case-insensitive fragment that must appear on the last line.
    Fragment(String),

    /// Regex searched over the data read since the last input.
    Pattern(Regex),
}

impl SubPrompt {
    /// Fragment sub-prompt.
    pub fn fragment(text: impl Into<String>) -> Self {
        SubPrompt::Fragment(text.into())
    }

    /// Regex sub-prompt.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(SubPrompt::Pattern(Regex::new(pattern)?))
    }
}

impl std::fmt::Display for SubPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubPrompt::Fragment(text) => write!(f, "{:?}", text),
            SubPrompt::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl PromptPattern for SubPrompt {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        match self {
            SubPrompt::Fragment(text) => {
                let (start, line) = last_line(data)?;
                let line = line.to_ascii_lowercase();
                let needle = text.to_ascii_lowercase();
                memmem::find(&line, needle.as_bytes()).map(|i| start + i)
            }
            SubPrompt::Pattern(re) => re.find_match(data),
        }
    }
}
