//! Output buffer with tail-only prompt search.
//!
//! Prompts only ever sit at the end of the output, so matchers are handed
//! the last `search_depth` bytes instead of the whole buffer. Long command
//! output (full routing tables, log dumps) stays cheap to scan after every
//! chunk.

use bytes::{Bytes, BytesMut};

use super::patterns::PromptPattern;

/// Buffer for accumulating shell output and searching its tail.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated output buffer.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let cleaned = strip_ansi_escapes::strip(data);
        self.buffer.extend_from_slice(&cleaned);
    }

    /// The searchable tail of the buffer and its offset in the full buffer.
    pub fn tail(&self) -> (usize, &[u8]) {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        (start, &self.buffer[start..])
    }

    /// Search only the tail of the buffer.
    ///
    /// Returns the match offset relative to the start of the full buffer.
    pub fn search_tail(&self, pattern: &dyn PromptPattern) -> Option<usize> {
        let (start, tail) = self.tail();
        pattern.find_match(tail).map(|offset| start + offset)
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &dyn PromptPattern) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
