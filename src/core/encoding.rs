//! XML Encoding Detection and Conversion
//!
//! Detects the input encoding from a byte order mark, the UTF-16 `<`
//! pattern, or the `encoding` pseudo-attribute of the XML declaration, and
//! converts the stream to UTF-8 chunk by chunk. Multi-byte sequences split
//! across chunks are carried over to the next call.

use memchr::memmem;

/// Supported input encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl XmlEncoding {
    /// Detect encoding from byte order mark, initial bytes, or XML declaration
    pub fn detect(input: &[u8]) -> Self {
        match input {
            [0xFF, 0xFE, ..] => XmlEncoding::Utf16Le,
            [0xFE, 0xFF, ..] => XmlEncoding::Utf16Be,
            [0xEF, 0xBB, 0xBF, ..] => XmlEncoding::Utf8,
            [0x00, b'<', ..] => XmlEncoding::Utf16Be,
            [b'<', 0x00, ..] => XmlEncoding::Utf16Le,
            _ => declared_encoding(input)
                .and_then(XmlEncoding::from_label)
                .unwrap_or(XmlEncoding::Utf8),
        }
    }

    /// Map an encoding label (case-insensitive) to a supported encoding
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Some(XmlEncoding::Utf8),
            "UTF-16LE" => Some(XmlEncoding::Utf16Le),
            "UTF-16BE" => Some(XmlEncoding::Utf16Be),
            // Unmarked UTF-16 without BOM defaults to big endian
            "UTF-16" => Some(XmlEncoding::Utf16Be),
            "ISO-8859-1" | "LATIN1" | "ISO_8859-1" | "L1" => Some(XmlEncoding::Latin1),
            "US-ASCII" | "ASCII" => Some(XmlEncoding::Ascii),
            _ => None,
        }
    }
}

/// Extract the `encoding="..."` value from a leading XML declaration
fn declared_encoding(input: &[u8]) -> Option<&str> {
    if !input.starts_with(b"<?xml") {
        return None;
    }
    let decl_end = memmem::find(input, b"?>")?;
    let decl = &input[..decl_end];
    let attr = memmem::find(decl, b"encoding")?;
    let rest = &decl[attr + b"encoding".len()..];
    let eq = rest.iter().position(|&b| b == b'=')?;
    let rest = &rest[eq + 1..];
    let open = rest.iter().position(|&b| b == b'"' || b == b'\'')?;
    let quote = rest[open];
    let value = &rest[open + 1..];
    let close = value.iter().position(|&b| b == quote)?;
    std::str::from_utf8(&value[..close]).ok()
}

/// Streaming converter from a detected/declared encoding to UTF-8
#[derive(Debug)]
pub struct Utf8Converter {
    encoding: Option<XmlEncoding>,
    /// Bytes of an incomplete sequence from the previous chunk
    carry: Vec<u8>,
    bom_checked: bool,
}

impl Utf8Converter {
    /// Create a converter that sniffs the encoding from the first chunk
    pub fn new() -> Self {
        Utf8Converter {
            encoding: None,
            carry: Vec::new(),
            bom_checked: false,
        }
    }

    /// Create a converter for an encoding declared by the input source
    pub fn with_label(label: &str) -> Result<Self, String> {
        let encoding = XmlEncoding::from_label(label)
            .ok_or_else(|| format!("Unsupported encoding: {}", label))?;
        Ok(Utf8Converter {
            encoding: Some(encoding),
            carry: Vec::new(),
            bom_checked: false,
        })
    }

    pub fn encoding(&self) -> Option<XmlEncoding> {
        self.encoding
    }

    /// Convert one chunk, appending UTF-8 to `out`
    ///
    /// Nothing is emitted until enough of the input has arrived to detect
    /// the encoding; see [`sniff_ready`].
    pub fn convert(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), String> {
        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(chunk);

        let start = if self.bom_checked {
            0
        } else if sniff_ready(&input) {
            self.settle(&input)
        } else {
            self.carry = input;
            return Ok(());
        };
        self.decode(&input[start..], out)
    }

    /// Flush at end of input; a leftover partial sequence is an error
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), String> {
        if !self.bom_checked && !self.carry.is_empty() {
            // Short document, detection never had a full prefix
            let input = std::mem::take(&mut self.carry);
            let start = self.settle(&input);
            self.decode(&input[start..], out)?;
        }
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err("Input ends inside a multi-byte character".to_string())
        }
    }

    /// Fix the encoding from the buffered prefix, returning the BOM length
    fn settle(&mut self, input: &[u8]) -> usize {
        self.bom_checked = true;
        let encoding = *self.encoding.get_or_insert_with(|| XmlEncoding::detect(input));
        bom_len(encoding, input)
    }

    fn decode(&mut self, body: &[u8], out: &mut Vec<u8>) -> Result<(), String> {
        let encoding = self.encoding.unwrap_or(XmlEncoding::Utf8);
        let consumed = match encoding {
            XmlEncoding::Utf8 => utf8_chunk(body, out)?,
            XmlEncoding::Utf16Le => utf16_chunk(body, out, u16::from_le_bytes)?,
            XmlEncoding::Utf16Be => utf16_chunk(body, out, u16::from_be_bytes)?,
            XmlEncoding::Latin1 => {
                out.extend(body.iter().flat_map(|&b| {
                    let mut buf = [0u8; 2];
                    let len = char::from(b).encode_utf8(&mut buf).len();
                    buf.into_iter().take(len)
                }));
                body.len()
            }
            XmlEncoding::Ascii => {
                if let Some(bad) = body.iter().position(|b| !b.is_ascii()) {
                    return Err(format!("Byte 0x{:02X} is not valid US-ASCII", body[bad]));
                }
                out.extend_from_slice(body);
                body.len()
            }
        };
        self.carry = body[consumed..].to_vec();
        Ok(())
    }
}

impl Default for Utf8Converter {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest prefix buffered while waiting for the end of an XML declaration
const SNIFF_LIMIT: usize = 1024;

/// Whether `input` is long enough to detect its encoding
///
/// Needs four bytes for the BOM and UTF-16 patterns. A prefix that is, or
/// may become, `<?xml` waits for `?>` up to [`SNIFF_LIMIT`] bytes.
fn sniff_ready(input: &[u8]) -> bool {
    if input.len() < 4 {
        return false;
    }
    const DECL: &[u8] = b"<?xml";
    let n = input.len().min(DECL.len());
    if input[..n] != DECL[..n] {
        return true;
    }
    input.len() >= SNIFF_LIMIT || memmem::find(input, b"?>").is_some()
}

fn bom_len(encoding: XmlEncoding, input: &[u8]) -> usize {
    match encoding {
        XmlEncoding::Utf8 if input.starts_with(&[0xEF, 0xBB, 0xBF]) => 3,
        XmlEncoding::Utf16Le if input.starts_with(&[0xFF, 0xFE]) => 2,
        XmlEncoding::Utf16Be if input.starts_with(&[0xFE, 0xFF]) => 2,
        _ => 0,
    }
}

/// Validate UTF-8, holding back an incomplete trailing sequence
fn utf8_chunk(body: &[u8], out: &mut Vec<u8>) -> Result<usize, String> {
    match std::str::from_utf8(body) {
        Ok(_) => {
            out.extend_from_slice(body);
            Ok(body.len())
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            out.extend_from_slice(&body[..valid]);
            Ok(valid)
        }
        Err(e) => Err(format!(
            "Input is not proper UTF-8, indicate encoding! (byte offset {})",
            e.valid_up_to()
        )),
    }
}

/// Decode UTF-16 code units, holding back an odd byte or a dangling high surrogate
fn utf16_chunk(
    body: &[u8],
    out: &mut Vec<u8>,
    to_unit: fn([u8; 2]) -> u16,
) -> Result<usize, String> {
    let mut units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    let mut consumed = units.len() * 2;
    if matches!(units.last(), Some(0xD800..=0xDBFF)) {
        units.pop();
        consumed -= 2;
    }

    let mut buf = [0u8; 4];
    for decoded in char::decode_utf16(units) {
        let c = decoded.map_err(|e| format!("Invalid UTF-16: unpaired surrogate 0x{:04X}", e.unpaired_surrogate()))?;
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    Ok(consumed)
}
