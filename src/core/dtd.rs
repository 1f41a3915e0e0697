//! DTD Entity Declarations
//!
//! Collects `<!ENTITY>` declarations from the DOCTYPE internal subset so the
//! lexer can expand references in content and attribute values. Element,
//! attribute-list and notation declarations are skipped; the parser does not
//! validate.

use memchr::{memchr, memmem};
use std::collections::{HashMap, HashSet};

use super::scanner::Scanner;

/// A general or parameter entity declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    /// Replacement text for internal entities
    pub value: Option<String>,
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    /// Notation name for unparsed entities
    pub ndata: Option<String>,
}

impl EntityDecl {
    pub fn internal(value: impl Into<String>) -> Self {
        EntityDecl {
            value: Some(value.into()),
            system_id: None,
            public_id: None,
            ndata: None,
        }
    }

    pub fn external(system_id: impl Into<String>, public_id: Option<String>) -> Self {
        EntityDecl {
            value: None,
            system_id: Some(system_id.into()),
            public_id,
            ndata: None,
        }
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.value.is_none()
    }

    #[inline]
    pub fn is_unparsed(&self) -> bool {
        self.ndata.is_some()
    }
}

/// Entities declared by a document
#[derive(Debug, Default, Clone)]
pub struct EntityTable {
    entities: HashMap<String, EntityDecl>,
    parameter_entities: HashMap<String, EntityDecl>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity declaration. The first declaration of a name wins.
    pub fn add_entity(&mut self, name: impl Into<String>, decl: EntityDecl, is_pe: bool) {
        let map = if is_pe {
            &mut self.parameter_entities
        } else {
            &mut self.entities
        };
        map.entry(name.into()).or_insert(decl);
    }

    /// Look up a general entity
    #[inline]
    pub fn get(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    /// Look up a parameter entity; these are recorded but never expanded
    pub fn parameter_entity(&self, name: &str) -> Option<&EntityDecl> {
        self.parameter_entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Reject internal entities that reference themselves, directly or indirectly
    pub fn check_entity_recursion(&self) -> Result<(), String> {
        for name in self.entities.keys() {
            let mut visited = HashSet::new();
            let mut stack = vec![name.as_str()];

            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    if current == name.as_str() {
                        return Err(format!(
                            "Detected an entity reference loop in '{}'",
                            name
                        ));
                    }
                    continue;
                }
                if let Some(value) = self.entities.get(current).and_then(|d| d.value.as_deref()) {
                    stack.extend(entity_references(value));
                }
            }
        }
        Ok(())
    }
}

/// Names of general entities referenced in an entity value
fn entity_references(value: &str) -> impl Iterator<Item = &str> {
    value.split('&').skip(1).filter_map(|part| {
        let end = part.find(';')?;
        let name = &part[..end];
        (!name.is_empty() && !name.starts_with('#')).then_some(name)
    })
}

/// Parse the internal subset of a DOCTYPE (the text between `[` and `]`)
pub fn parse_internal_subset(subset: &str) -> Result<EntityTable, String> {
    let bytes = subset.as_bytes();
    let mut table = EntityTable::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        match rest[0] {
            b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
            b'%' => {
                // Parameter entity references are not expanded
                let end = memchr(b';', rest).ok_or("PEReference: expecting ';'")?;
                pos += end + 1;
            }
            b'<' if rest.starts_with(b"<!--") => {
                let end = memmem::find(&rest[4..], b"-->").ok_or("Comment not terminated")?;
                pos += 4 + end + 3;
            }
            b'<' if rest.starts_with(b"<?") => {
                let end = memmem::find(&rest[2..], b"?>").ok_or("PI not terminated")?;
                pos += 2 + end + 2;
            }
            b'<' if rest.starts_with(b"<!ENTITY") => {
                let (name, decl, is_pe, len) = parse_entity_decl(subset, pos)?;
                table.add_entity(name, decl, is_pe);
                pos += len;
            }
            b'<' if rest.starts_with(b"<!") => {
                let end = Scanner::new(rest, 2)
                    .find_tag_end_quoted()
                    .ok_or("Markup declaration not terminated")?;
                pos += end + 1;
            }
            other => {
                return Err(format!(
                    "Unexpected character '{}' in internal subset",
                    other as char
                ))
            }
        }
    }

    table.check_entity_recursion()?;
    Ok(table)
}

/// Parse one `<!ENTITY ...>` declaration starting at `start`.
/// Returns (name, declaration, is_parameter_entity, consumed_len).
fn parse_entity_decl(subset: &str, start: usize) -> Result<(String, EntityDecl, bool, usize), String> {
    let bytes = subset.as_bytes();
    let mut s = Scanner::new(bytes, start + b"<!ENTITY".len());

    require_whitespace(&mut s, "Space required after '<!ENTITY'")?;
    let is_pe = s.peek() == Some(b'%');
    if is_pe {
        s.advance(1);
        require_whitespace(&mut s, "Space required after '%'")?;
    }

    let (ns, ne) = s.read_name().ok_or("xmlParseEntityDecl: no name")?;
    let name = subset[ns..ne].to_string();
    require_whitespace(&mut s, "Space required after the entity name")?;

    let mut decl = if s.starts_with(b"SYSTEM") {
        s.advance(6);
        require_whitespace(&mut s, "Space required after 'SYSTEM'")?;
        EntityDecl::external(quoted(&mut s, subset)?, None)
    } else if s.starts_with(b"PUBLIC") {
        s.advance(6);
        require_whitespace(&mut s, "Space required after 'PUBLIC'")?;
        let public_id = quoted(&mut s, subset)?.to_string();
        require_whitespace(&mut s, "Space required after the Public Identifier")?;
        EntityDecl::external(quoted(&mut s, subset)?, Some(public_id))
    } else {
        EntityDecl::internal(quoted(&mut s, subset)?)
    };

    s.skip_whitespace();
    if decl.is_external() && s.starts_with(b"NDATA") {
        if is_pe {
            return Err("NDATA not allowed for parameter entities".to_string());
        }
        s.advance(5);
        require_whitespace(&mut s, "Space required after 'NDATA'")?;
        let (ns, ne) = s.read_name().ok_or("NDATA: no notation name")?;
        decl.ndata = Some(subset[ns..ne].to_string());
        s.skip_whitespace();
    }

    if s.peek() != Some(b'>') {
        return Err(format!("EntityDecl: entity {} not terminated", name));
    }
    Ok((name, decl, is_pe, s.position() + 1 - start))
}

fn require_whitespace(s: &mut Scanner<'_>, message: &str) -> Result<(), String> {
    let before = s.position();
    s.skip_whitespace();
    if s.position() == before {
        return Err(message.to_string());
    }
    Ok(())
}

/// Read a quoted literal, returning its contents
fn quoted<'a>(s: &mut Scanner<'_>, text: &'a str) -> Result<&'a str, String> {
    let quote = match s.peek() {
        Some(q @ (b'"' | b'\'')) => q,
        _ => return Err("EntityValue: \" or ' expected".to_string()),
    };
    s.advance(1);
    let start = s.position();
    let end = s.find_byte(quote).ok_or("EntityValue: literal not terminated")?;
    s.set_position(end + 1);
    Ok(&text[start..end])
}
