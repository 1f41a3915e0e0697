//! Input Sources
//!
//! An [`InputSource`] bundles a byte stream with its identifiers and an
//! optional declared encoding. A [`ChunkReader`] pulls fixed-size chunks
//! from the stream, using an internal buffer, and converts them to UTF-8 for
//! the lexer.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use thiserror::Error;

use crate::core::encoding::Utf8Converter;

/// Buffer size for reading chunks
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A document (or external entity) to parse
#[derive(Default)]
pub struct InputSource {
    stream: Option<Box<dyn Read + Send>>,
    available: usize,
    system_id: Option<String>,
    public_id: Option<String>,
    encoding: Option<String>,
}

impl InputSource {
    /// Create a source without a stream. Parsing it is a configuration error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an in-memory document. All bytes count as immediately available.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        InputSource {
            available: bytes.len(),
            stream: Some(Box::new(Cursor::new(bytes))),
            ..Self::default()
        }
    }

    /// Parse from any reader. Nothing is assumed available up front.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        InputSource {
            stream: Some(Box::new(reader)),
            ..Self::default()
        }
    }

    /// Open a file; its size is reported as available and its path becomes the system id
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(InputSource {
            stream: Some(Box::new(file)),
            available: usize::try_from(len).unwrap_or(usize::MAX),
            system_id: Some(path.display().to_string()),
            ..Self::default()
        })
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    /// Declare the encoding, overriding detection
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Override the number of bytes reported as immediately available
    pub fn with_available(mut self, available: usize) -> Self {
        self.available = available;
        self
    }

    #[inline]
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    #[inline]
    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    #[inline]
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }

    #[inline]
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn take_stream(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stream.take()
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("has_stream", &self.stream.is_some())
            .field("available", &self.available)
            .field("system_id", &self.system_id)
            .field("public_id", &self.public_id)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Failure while reading or decoding input
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Encoding(String),
}

/// Reads a stream in chunks and converts each to UTF-8
pub struct ChunkReader {
    stream: Box<dyn Read + Send>,
    converter: Utf8Converter,
    raw: Vec<u8>,
    out: Vec<u8>,
    eof: bool,
}

impl ChunkReader {
    /// Create a reader. `encoding` overrides detection when present.
    pub fn new(
        stream: Box<dyn Read + Send>,
        encoding: Option<&str>,
        chunk_size: usize,
    ) -> Result<Self, ChunkError> {
        let converter = match encoding {
            Some(label) => Utf8Converter::with_label(label).map_err(ChunkError::Encoding)?,
            None => Utf8Converter::new(),
        };
        Ok(ChunkReader {
            stream,
            converter,
            raw: vec![0u8; chunk_size.max(1)],
            out: Vec::with_capacity(chunk_size),
            eof: false,
        })
    }

    /// Read and convert the next chunk. Returns None at end of input.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>, ChunkError> {
        loop {
            if self.eof {
                return Ok(None);
            }
            self.out.clear();

            let read = match self.stream.read(&mut self.raw) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                self.eof = true;
                self.converter
                    .finish(&mut self.out)
                    .map_err(ChunkError::Encoding)?;
                if self.out.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(&self.out));
            }

            self.converter
                .convert(&self.raw[..read], &mut self.out)
                .map_err(ChunkError::Encoding)?;
            if !self.out.is_empty() {
                return Ok(Some(&self.out));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(mut reader: ChunkReader) -> Vec<u8> {
        let mut result = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            result.extend_from_slice(chunk);
        }
        result
    }

    #[test]
    fn test_from_bytes_available() {
        let source = InputSource::from_bytes(b"<root/>".to_vec()).with_system_id("mem:1");
        assert_eq!(source.available(), 7);
        assert_eq!(source.system_id(), Some("mem:1"));
        assert!(source.has_stream());
    }

    #[test]
    fn test_from_reader_reports_nothing_available() {
        let source = InputSource::from_reader(Cursor::new(vec![b'<'; 50_000]));
        assert_eq!(source.available(), 0);
        assert_eq!(source.with_available(20_000).available(), 20_000);
    }

    #[test]
    fn test_chunked_read() {
        let data = b"<root>content</root>".repeat(100);
        let mut source = InputSource::from_bytes(data.clone());
        let reader = ChunkReader::new(source.take_stream().unwrap(), None, 7).unwrap();
        assert_eq!(read_all(reader), data);
    }

    #[test]
    fn test_declared_encoding() {
        let mut source = InputSource::from_bytes(b"<a>\xE9</a>".to_vec()).with_encoding("ISO-8859-1");
        let encoding = source.encoding().map(str::to_string);
        let reader = ChunkReader::new(source.take_stream().unwrap(), encoding.as_deref(), 4).unwrap();
        assert_eq!(read_all(reader), "<a>é</a>".as_bytes());
    }

    #[test]
    fn test_sniffing_survives_short_reads() {
        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "<a>é</a>".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        let reader = ChunkReader::new(Box::new(Cursor::new(utf16)), None, 1).unwrap();
        assert_eq!(read_all(reader), "<a>é</a>".as_bytes());

        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>\xE9</a>".to_vec();
        let reader = ChunkReader::new(Box::new(Cursor::new(latin1)), None, 8).unwrap();
        assert!(read_all(reader).ends_with("<a>é</a>".as_bytes()));
    }

    #[test]
    fn test_unsupported_encoding() {
        let stream: Box<dyn Read + Send> = Box::new(Cursor::new(Vec::new()));
        assert!(matches!(
            ChunkReader::new(stream, Some("EBCDIC"), 16),
            Err(ChunkError::Encoding(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(InputSource::from_file("/nonexistent/file.xml").is_err());
    }
}
