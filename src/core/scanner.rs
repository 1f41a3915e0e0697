//! SIMD-accelerated XML scanning using memchr
//!
//! The scanner is a cursor over the lexer's current window. Every search
//! returns `None` when the delimiter is not (yet) in the window, which the
//! lexer treats as "need more input" until the final chunk arrives.

use memchr::{memchr, memchr2, memmem};

/// Cursor over a byte window
pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a [u8], pos: usize) -> Self {
        Scanner { input, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.input[start..end]
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Number of bytes left in the window
    #[inline]
    pub fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.input[self.pos.min(self.input.len())..].starts_with(needle)
    }

    /// True if the window ends inside a (possibly matching) prefix of `needle`
    #[inline]
    pub fn is_prefix_of(&self, needle: &[u8]) -> bool {
        let rest = &self.input[self.pos.min(self.input.len())..];
        rest.len() < needle.len() && needle.starts_with(rest)
    }

    /// Skip XML whitespace (space, tab, newline, carriage return)
    #[inline]
    pub fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    /// Find next occurrence of a byte
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, &self.input[self.pos..]).map(|i| self.pos + i)
    }

    /// Find next '<' or '&' (text content boundaries)
    #[inline]
    pub fn find_text_boundary(&self) -> Option<usize> {
        memchr2(b'<', b'&', &self.input[self.pos..]).map(|i| self.pos + i)
    }

    /// Find the next occurrence of a multi-byte terminator such as `-->`
    #[inline]
    pub fn find_seq(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.input[self.pos..], needle).map(|i| self.pos + i)
    }

    /// Find tag end while handling quotes properly.
    /// Returns the position of '>' that is not inside quotes.
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let mut quote: Option<u8> = None;
        for (i, &b) in self.input[self.pos..].iter().enumerate() {
            match (quote, b) {
                (None, b'"' | b'\'') => quote = Some(b),
                (Some(q), _) if q == b => quote = None,
                (None, b'>') => return Some(self.pos + i),
                _ => {}
            }
        }
        None
    }

    /// Read an XML name, returning its byte range
    pub fn read_name(&mut self) -> Option<(usize, usize)> {
        let start = self.pos;
        if !is_name_start_char(self.peek()?) {
            return None;
        }
        self.pos += 1;
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.pos += 1;
        }
        Some((start, self.pos))
    }
}

/// Check if byte is valid XML name start character
/// Allows ASCII letters, underscore, colon, and non-ASCII (UTF-8 Unicode)
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

/// Check if byte is valid XML name character
#[inline]
pub fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

/// True if every byte is XML whitespace
#[inline]
pub fn is_whitespace(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}
