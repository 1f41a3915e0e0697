//! XML Entity Decoding
//!
//! Handles the predefined entities (`&lt;` `&gt;` `&amp;` `&quot;` `&apos;`),
//! numeric character references and internal entities declared in the
//! DOCTYPE. Attribute values are normalized as well: literal whitespace
//! becomes a space and references are expanded recursively.
//!
//! Uses Cow for zero-copy when no normalization is needed.

use memchr::{memchr, memchr3};
use std::borrow::Cow;
use thiserror::Error;

use super::dtd::EntityTable;

/// Failure to expand a reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("Entity '{0}' not defined")]
    Undefined(String),
    #[error("Attribute references external entity '{0}'")]
    External(String),
    #[error("Entity reference to unparsed entity {0}")]
    Unparsed(String),
    #[error("xmlParseCharRef: invalid xmlChar value in '&{0};'")]
    InvalidCharRef(String),
    #[error("'<' in entity '{0}' is not allowed in attributes values")]
    LtInValue(String),
    #[error("Detected an entity reference loop in '{0}'")]
    Loop(String),
    #[error("Maximum entity nesting depth exceeded at '{0}'")]
    TooDeep(String),
    #[error("EntityRef: expecting ';'")]
    Malformed,
}

/// Replacement text of a predefined entity
#[inline]
pub fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        _ => None,
    }
}

/// Decode a character reference body (the text after `&#`, before `;`)
pub fn decode_char_ref(body: &str) -> Option<char> {
    let codepoint = match body.strip_prefix('x') {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u32::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) => {
            body.parse::<u32>().ok()?
        }
        None => return None,
    };
    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}

/// Normalize an attribute value: map literal whitespace to spaces and
/// expand character and entity references.
///
/// Returns Borrowed if the value needs no changes.
pub fn normalize_attribute_value<'a>(
    raw: &'a str,
    entities: &EntityTable,
    max_depth: usize,
) -> Result<Cow<'a, str>, EntityError> {
    if memchr3(b'&', b'\t', b'\n', raw.as_bytes()).is_none() && memchr(b'\r', raw.as_bytes()).is_none() {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut expanding = Vec::new();
    append_normalized(raw, entities, max_depth, &mut expanding, &mut out)?;
    Ok(Cow::Owned(out))
}

fn append_normalized<'t>(
    raw: &'t str,
    entities: &'t EntityTable,
    max_depth: usize,
    expanding: &mut Vec<&'t str>,
    out: &mut String,
) -> Result<(), EntityError> {
    let mut pos = 0;
    while pos < raw.len() {
        let amp = memchr(b'&', &raw.as_bytes()[pos..]).map_or(raw.len(), |i| pos + i);
        push_whitespace_normalized(&raw[pos..amp], out);
        if amp == raw.len() {
            break;
        }

        let semi = memchr(b';', &raw.as_bytes()[amp..])
            .map(|i| amp + i)
            .ok_or(EntityError::Malformed)?;
        let name = &raw[amp + 1..semi];
        pos = semi + 1;

        if let Some(body) = name.strip_prefix('#') {
            let c = decode_char_ref(body).ok_or_else(|| EntityError::InvalidCharRef(name.to_string()))?;
            out.push(c);
        } else if let Some(text) = predefined_entity(name) {
            out.push_str(text);
        } else if name.is_empty() {
            return Err(EntityError::Malformed);
        } else {
            let decl = entities
                .get(name)
                .ok_or_else(|| EntityError::Undefined(name.to_string()))?;
            if decl.is_unparsed() {
                return Err(EntityError::Unparsed(name.to_string()));
            }
            let value = decl
                .value
                .as_deref()
                .ok_or_else(|| EntityError::External(name.to_string()))?;
            if memchr(b'<', value.as_bytes()).is_some() {
                return Err(EntityError::LtInValue(name.to_string()));
            }
            if expanding.contains(&name) {
                return Err(EntityError::Loop(name.to_string()));
            }
            if expanding.len() >= max_depth {
                return Err(EntityError::TooDeep(name.to_string()));
            }
            expanding.push(name);
            append_normalized(value, entities, max_depth, expanding, out)?;
            expanding.pop();
        }
    }
    Ok(())
}

/// Copy text, mapping tab/newline/carriage return to a space (`\r\n` → one space)
fn push_whitespace_normalized(text: &str, out: &mut String) {
    let mut after_cr = false;
    for c in text.chars() {
        match c {
            '\n' if after_cr => {}
            '\t' | '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
        after_cr = c == '\r';
    }
}

/// Normalize line endings in character data (`\r\n` and lone `\r` become `\n`)
#[inline]
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if memchr(b'\r', text.as_bytes()).is_none() {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}
