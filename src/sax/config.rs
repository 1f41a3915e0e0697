//! Parser Configuration

use crate::core::lexer::DEFAULT_MAX_ENTITY_DEPTH;
use crate::reader::DEFAULT_CHUNK_SIZE;

/// Whether scanning runs on its own thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingMode {
    /// Threaded when the input reports more than `thread_threshold` bytes
    /// immediately available
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub threading: ThreadingMode,
    pub thread_threshold: usize,
    /// Records per batch
    pub batch_capacity: usize,
    /// Pending batches at which the scanner blocks
    pub high_water: usize,
    /// Pending batches at which a blocked scanner resumes
    pub low_water: usize,
    pub read_chunk_size: usize,
    /// Names memoized in front of the token resolver; 0 disables the memo
    pub token_cache_capacity: usize,
    pub max_entity_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            threading: ThreadingMode::Auto,
            thread_threshold: 10_000,
            batch_capacity: 1000,
            high_water: 8,
            low_water: 4,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            token_cache_capacity: 256,
            max_entity_depth: DEFAULT_MAX_ENTITY_DEPTH,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threading(mut self, threading: ThreadingMode) -> Self {
        self.threading = threading;
        self
    }

    pub fn with_thread_threshold(mut self, bytes: usize) -> Self {
        self.thread_threshold = bytes;
        self
    }

    pub fn with_batch_capacity(mut self, records: usize) -> Self {
        self.batch_capacity = records.max(1);
        self
    }

    /// Set both water marks. `low` is clamped below `high`.
    pub fn with_water_marks(mut self, high: usize, low: usize) -> Self {
        self.high_water = high.max(1);
        self.low_water = low.min(self.high_water - 1);
        self
    }

    pub fn with_read_chunk_size(mut self, bytes: usize) -> Self {
        self.read_chunk_size = bytes.max(1);
        self
    }

    pub fn with_token_cache_capacity(mut self, names: usize) -> Self {
        self.token_cache_capacity = names;
        self
    }

    pub fn with_max_entity_depth(mut self, depth: usize) -> Self {
        self.max_entity_depth = depth;
        self
    }

    /// Decide the threading mode for an input with `available` bytes ready
    pub fn use_threads(&self, available: usize) -> bool {
        match self.threading {
            ThreadingMode::Always => true,
            ThreadingMode::Never => false,
            ThreadingMode::Auto => available > self.thread_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.batch_capacity, 1000);
        assert_eq!((config.high_water, config.low_water), (8, 4));
        assert_eq!(config.read_chunk_size, 16 * 1024);
    }

    #[test]
    fn test_auto_threshold() {
        let config = ParserConfig::default();
        assert!(!config.use_threads(10_000));
        assert!(config.use_threads(10_001));
        assert!(config.clone().with_threading(ThreadingMode::Always).use_threads(0));
        assert!(!config.with_threading(ThreadingMode::Never).use_threads(1 << 20));
    }

    #[test]
    fn test_water_marks_normalised() {
        let config = ParserConfig::default().with_water_marks(0, 5);
        assert_eq!((config.high_water, config.low_water), (1, 0));
        let config = ParserConfig::default().with_water_marks(3, 3);
        assert_eq!((config.high_water, config.low_water), (3, 2));
    }
}
