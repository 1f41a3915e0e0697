//! XML Reader Module
//!
//! Input plumbing for the parser:
//! - InputSource: a byte stream plus system/public id and declared encoding
//! - ChunkReader: fixed-size reads converted to UTF-8

pub mod source;

pub use source::{ChunkError, ChunkReader, InputSource, DEFAULT_CHUNK_SIZE};
