//! Source Position Tracking
//!
//! Maps byte offsets in the lexer's sliding window to 1-based line and
//! column numbers. Columns count characters, not bytes.

use memchr::{memchr_iter, memrchr};

/// A 1-based line/column position in the decoded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

impl TextPosition {
    /// Position of the first character of a document
    pub const START: TextPosition = TextPosition { line: 1, column: 1 };

    #[inline]
    pub const fn new(line: u32, column: u32) -> Self {
        TextPosition { line, column }
    }

    /// Advance this position over `bytes`
    pub fn advanced(mut self, bytes: &[u8]) -> Self {
        let newlines = memchr_iter(b'\n', bytes).count();
        if newlines == 0 {
            self.column = self.column.saturating_add(char_count(bytes) as u32);
        } else {
            // memrchr cannot miss here, a newline was counted above
            let last = memrchr(b'\n', bytes).unwrap_or(0);
            self.line = self.line.saturating_add(newlines as u32);
            self.column = 1 + char_count(&bytes[last + 1..]) as u32;
        }
        self
    }
}

impl Default for TextPosition {
    fn default() -> Self {
        TextPosition::START
    }
}

impl std::fmt::Display for TextPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Count UTF-8 characters (every byte that is not a continuation byte)
#[inline]
fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b & 0xC0 != 0x80).count()
}

/// Incremental offset → position mapping for a buffer that is periodically
/// drained from the front.
///
/// Lookups are cached so that a forward-moving sequence of queries costs
/// O(bytes scanned) overall.
#[derive(Debug, Clone)]
pub struct LineTracker {
    /// Position of `buf[0]`
    base: TextPosition,
    /// Last resolved offset and its position
    cached_offset: usize,
    cached: TextPosition,
}

impl LineTracker {
    pub fn new() -> Self {
        LineTracker {
            base: TextPosition::START,
            cached_offset: 0,
            cached: TextPosition::START,
        }
    }

    /// Position of `buf[offset]`
    pub fn position_at(&mut self, buf: &[u8], offset: usize) -> TextPosition {
        let offset = offset.min(buf.len());
        if offset < self.cached_offset {
            self.cached_offset = 0;
            self.cached = self.base;
        }
        self.cached = self.cached.advanced(&buf[self.cached_offset..offset]);
        self.cached_offset = offset;
        self.cached
    }

    /// Account for `n` bytes about to be removed from the front of `buf`
    pub fn drain(&mut self, buf: &[u8], n: usize) {
        self.base = self.position_at(buf, n);
        self.cached = self.base;
        self.cached_offset = 0;
    }
}

impl Default for LineTracker {
    fn default() -> Self {
        Self::new()
    }
}
