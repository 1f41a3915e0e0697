//! Incremental XML Lexer with ScanHandler Trait
//!
//! Push-style tokenizer: UTF-8 input arrives in arbitrary chunks through
//! [`Lexer::feed`] and lexical events are reported through [`ScanHandler`].
//! A construct that straddles a chunk boundary stays in the window until it
//! is complete; [`Lexer::finish`] marks the end of input and reports
//! anything left unterminated.
//!
//! The lexer checks well-formedness (tag nesting, attribute syntax, entity
//! references, single root) but does not validate against a DTD. Internal
//! entities are expanded by scanning their replacement text with a nested
//! lexer, so markup inside an entity produces ordinary events. External
//! parsed entities are handed to [`ScanHandler::external_entity`].

use memchr::{memchr, memmem};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

use super::dtd::{self, EntityDecl, EntityTable};
use super::entities::{self, normalize_newlines};
use super::position::{LineTracker, TextPosition};
use super::scanner::{is_name_char, is_name_start_char, is_whitespace, Scanner};

/// Default limit on nested entity expansion
pub const DEFAULT_MAX_ENTITY_DEPTH: usize = 8;

/// An attribute as written in a start tag. The value is already normalized
/// and has its references expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute<'a> {
    pub name: &'a str,
    pub value: Cow<'a, str>,
}

/// Trait for handling lexical events
///
/// Positions are those of the first character of the construct (the `<` of
/// a tag, the `&` of a reference, the first character of a text run).
pub trait ScanHandler {
    /// Called when an element starts. Empty elements (`<br/>`) are reported
    /// as a start immediately followed by an end.
    fn start_element(&mut self, name: &str, attrs: &[RawAttribute<'_>], at: TextPosition);

    fn end_element(&mut self, name: &str, at: TextPosition);

    /// Called for character data. A single text node may arrive in several
    /// calls: around references, for CDATA sections and at chunk boundaries.
    fn characters(&mut self, text: &str, at: TextPosition);

    fn comment(&mut self, _text: &str, _at: TextPosition) {}

    fn processing_instruction(&mut self, _target: &str, _data: &str, _at: TextPosition) {}

    /// Called once the DOCTYPE has been read, with the entities it declares
    fn doctype(&mut self, _name: &str, _entities: &Arc<EntityTable>) {}

    /// Called for a reference to an external parsed entity. The default
    /// skips the entity.
    fn external_entity(
        &mut self,
        _name: &str,
        _decl: &EntityDecl,
        _at: TextPosition,
    ) -> Result<(), LexError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    Syntax,
    Encoding,
    Entity,
    /// The handler stopped the scan and has already reported why
    Aborted,
}

/// A fatal lexical error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub position: TextPosition,
}

impl LexError {
    pub fn new(kind: LexErrorKind, message: impl Into<String>, position: TextPosition) -> Self {
        LexError {
            kind,
            message: message.into(),
            position,
        }
    }

    pub fn aborted(position: TextPosition) -> Self {
        LexError::new(LexErrorKind::Aborted, "Parsing aborted", position)
    }
}

/// What the lexer accepts at top level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    /// A complete document: prolog, exactly one root element, misc
    Document,
    /// Entity content: any balanced mix of elements and text
    Fragment,
}

enum Step {
    Advanced,
    /// The construct is not complete in the window
    NeedMore(&'static str),
}

enum Markup {
    Incomplete,
    StartTag,
    EndTag,
    Comment,
    CData,
    Doctype,
    ProcessingInstruction,
    Invalid,
}

type TagError = (LexErrorKind, String);

struct StartTag<'a> {
    name: &'a str,
    attributes: Vec<RawAttribute<'a>>,
    is_empty: bool,
}

/// Incremental lexer over a sliding window of UTF-8 input
pub struct Lexer {
    buf: Vec<u8>,
    pos: usize,
    /// Bytes already drained from the front of `buf`
    consumed: usize,
    tracker: LineTracker,
    /// Fixed position reported for every event (entity expansions)
    origin: Option<TextPosition>,
    open: Vec<String>,
    entities: Arc<EntityTable>,
    mode: LexMode,
    seen_root: bool,
    seen_doctype: bool,
    allow_xml_decl: bool,
    halted: bool,
    max_entity_depth: usize,
    /// Internal entities being expanded, outermost first
    expanding: Vec<String>,
}

impl Lexer {
    pub fn new(mode: LexMode) -> Self {
        Lexer {
            buf: Vec::new(),
            pos: 0,
            consumed: 0,
            tracker: LineTracker::new(),
            origin: None,
            open: Vec::new(),
            entities: Arc::new(EntityTable::new()),
            mode,
            seen_root: false,
            seen_doctype: false,
            allow_xml_decl: true,
            halted: false,
            max_entity_depth: DEFAULT_MAX_ENTITY_DEPTH,
            expanding: Vec::new(),
        }
    }

    /// Use entities declared elsewhere (the document an entity belongs to)
    pub fn with_entities(mut self, entities: Arc<EntityTable>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_max_entity_depth(mut self, depth: usize) -> Self {
        self.max_entity_depth = depth;
        self
    }

    #[inline]
    pub fn entities(&self) -> &Arc<EntityTable> {
        &self.entities
    }

    /// Number of currently open elements
    #[inline]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// True once the lexer has failed or finished; further input is ignored
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Feed the next chunk of input
    pub fn feed<H: ScanHandler + ?Sized>(&mut self, chunk: &[u8], handler: &mut H) -> Result<(), LexError> {
        if self.halted {
            return Ok(());
        }
        self.buf.extend_from_slice(chunk);
        self.run(handler, false)
    }

    /// Signal end of input
    pub fn finish<H: ScanHandler + ?Sized>(&mut self, handler: &mut H) -> Result<(), LexError> {
        if self.halted {
            return Ok(());
        }
        let result = self.run(handler, true);
        self.halted = true;
        result
    }

    fn run<H: ScanHandler + ?Sized>(&mut self, h: &mut H, last: bool) -> Result<(), LexError> {
        let result = self.scan(h, last);
        if result.is_err() {
            self.halted = true;
        }
        result
    }

    fn scan<H: ScanHandler + ?Sized>(&mut self, h: &mut H, last: bool) -> Result<(), LexError> {
        while self.pos < self.buf.len() {
            let step = match self.buf[self.pos] {
                b'<' => self.markup(h)?,
                b'&' => self.reference(h, last)?,
                _ => self.text(h, last)?,
            };
            if let Step::NeedMore(construct) = step {
                if last {
                    let at = self.position(self.pos);
                    return Err(LexError::new(
                        LexErrorKind::Syntax,
                        format!("Premature end of data in {}", construct),
                        at,
                    ));
                }
                break;
            }
        }
        self.compact();
        if last {
            self.check_end()?;
        }
        Ok(())
    }

    fn check_end(&mut self) -> Result<(), LexError> {
        let end = self.buf.len();
        if let Some(name) = self.open.last().cloned() {
            let at = self.position(end);
            return Err(LexError::new(
                LexErrorKind::Syntax,
                format!("Premature end of data in tag {}", name),
                at,
            ));
        }
        if self.mode == LexMode::Document && !self.seen_root {
            let at = self.position(end);
            return Err(LexError::new(LexErrorKind::Syntax, "Document is empty", at));
        }
        Ok(())
    }

    #[inline]
    fn position(&mut self, offset: usize) -> TextPosition {
        match self.origin {
            Some(at) => at,
            None => self.tracker.position_at(&self.buf, offset),
        }
    }

    /// Drop everything before `pos` from the window
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.tracker.drain(&self.buf, self.pos);
        self.buf.drain(..self.pos);
        self.consumed += self.pos;
        self.pos = 0;
    }

    #[inline]
    fn outside_root(&self) -> bool {
        self.mode == LexMode::Document && self.open.is_empty()
    }

    fn misplaced_content(&self, at: TextPosition) -> LexError {
        let message = if self.seen_root {
            "Extra content at the end of the document"
        } else {
            "Start tag expected, '<' not found"
        };
        LexError::new(LexErrorKind::Syntax, message, at)
    }

    fn text<H: ScanHandler + ?Sized>(&mut self, h: &mut H, last: bool) -> Result<Step, LexError> {
        let start = self.pos;
        let end = match Scanner::new(&self.buf, start).find_text_boundary() {
            Some(end) => end,
            None if last => self.buf.len(),
            None => {
                // Keep a split character or a '\r' that may pair with '\n'
                let mut end = start + utf8_boundary(&self.buf[start..]);
                if end > start && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
                if end == start {
                    return Ok(Step::NeedMore("character data"));
                }
                end
            }
        };

        let at = self.position(start);
        if self.outside_root() {
            if !is_whitespace(&self.buf[start..end]) {
                return Err(self.misplaced_content(at));
            }
        } else {
            let text = as_str(&self.buf[start..end], at)?;
            h.characters(&normalize_newlines(text), at);
        }
        self.pos = end;
        Ok(Step::Advanced)
    }

    fn reference<H: ScanHandler + ?Sized>(&mut self, h: &mut H, last: bool) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(semi) = memchr(b';', &self.buf[start..]).map(|i| start + i) else {
            let plausible = self.buf[start + 1..]
                .iter()
                .all(|&b| is_name_char(b) || b == b'#');
            if !last && plausible {
                return Ok(Step::NeedMore("entity reference"));
            }
            let at = self.position(start);
            return Err(LexError::new(LexErrorKind::Syntax, "EntityRef: expecting ';'", at));
        };

        let at = self.position(start);
        if self.outside_root() {
            return Err(self.misplaced_content(at));
        }
        let body = as_str(&self.buf[start + 1..semi], at)?.to_string();
        self.pos = semi + 1;

        if let Some(char_ref) = body.strip_prefix('#') {
            let c = entities::decode_char_ref(char_ref).ok_or_else(|| {
                LexError::new(
                    LexErrorKind::Syntax,
                    format!("xmlParseCharRef: invalid xmlChar value in '&{};'", body),
                    at,
                )
            })?;
            h.characters(c.encode_utf8(&mut [0u8; 4]), at);
            return Ok(Step::Advanced);
        }

        let mut names = Scanner::new(body.as_bytes(), 0);
        if names.read_name() != Some((0, body.len())) {
            return Err(LexError::new(
                LexErrorKind::Syntax,
                "xmlParseEntityRef: no name",
                at,
            ));
        }

        if let Some(text) = entities::predefined_entity(&body) {
            h.characters(text, at);
            return Ok(Step::Advanced);
        }

        let table = Arc::clone(&self.entities);
        let decl = table.get(&body).ok_or_else(|| {
            LexError::new(
                LexErrorKind::Entity,
                format!("Entity '{}' not defined", body),
                at,
            )
        })?;
        if decl.is_unparsed() {
            return Err(LexError::new(
                LexErrorKind::Entity,
                format!("Entity reference to unparsed entity {}", body),
                at,
            ));
        }
        match decl.value.as_deref() {
            Some(value) => self.expand_internal(&body, value, at, h)?,
            None => h.external_entity(&body, decl, at)?,
        }
        Ok(Step::Advanced)
    }

    /// Scan the replacement text of an internal entity as content
    fn expand_internal<H: ScanHandler + ?Sized>(
        &self,
        name: &str,
        value: &str,
        at: TextPosition,
        h: &mut H,
    ) -> Result<(), LexError> {
        if self.expanding.iter().any(|n| n == name) {
            return Err(LexError::new(
                LexErrorKind::Entity,
                format!("Detected an entity reference loop in '{}'", name),
                at,
            ));
        }
        if self.expanding.len() >= self.max_entity_depth {
            return Err(LexError::new(
                LexErrorKind::Entity,
                format!("Maximum entity nesting depth exceeded at '{}'", name),
                at,
            ));
        }

        let mut nested = Lexer::new(LexMode::Fragment)
            .with_entities(Arc::clone(&self.entities))
            .with_max_entity_depth(self.max_entity_depth);
        nested.origin = Some(at);
        nested.allow_xml_decl = false;
        nested.expanding = self.expanding.clone();
        nested.expanding.push(name.to_string());

        nested.feed(value.as_bytes(), h)?;
        nested.finish(h)
    }

    fn markup<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let kind = {
            let s = Scanner::new(&self.buf, self.pos);
            match s.peek_at(1) {
                None => Markup::Incomplete,
                Some(b'/') => Markup::EndTag,
                Some(b'?') => Markup::ProcessingInstruction,
                Some(b'!') if s.starts_with(b"<!--") => Markup::Comment,
                Some(b'!') if s.starts_with(b"<![CDATA[") => Markup::CData,
                Some(b'!') if s.starts_with(b"<!DOCTYPE") => Markup::Doctype,
                Some(b'!')
                    if s.is_prefix_of(b"<!--")
                        || s.is_prefix_of(b"<![CDATA[")
                        || s.is_prefix_of(b"<!DOCTYPE") =>
                {
                    Markup::Incomplete
                }
                Some(c) if is_name_start_char(c) => Markup::StartTag,
                Some(_) => Markup::Invalid,
            }
        };

        match kind {
            Markup::Incomplete => Ok(Step::NeedMore("markup")),
            Markup::StartTag => self.start_tag(h),
            Markup::EndTag => self.end_tag(h),
            Markup::Comment => self.comment(h),
            Markup::CData => self.cdata(h),
            Markup::Doctype => self.doctype(h),
            Markup::ProcessingInstruction => self.processing_instruction(h),
            Markup::Invalid => {
                let at = self.position(self.pos);
                Err(LexError::new(
                    LexErrorKind::Syntax,
                    "StartTag: invalid element name",
                    at,
                ))
            }
        }
    }

    fn start_tag<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(end) = Scanner::new(&self.buf, start).find_tag_end_quoted() else {
            return Ok(Step::NeedMore("start tag"));
        };
        let at = self.position(start);
        if self.outside_root() && self.seen_root {
            return Err(self.misplaced_content(at));
        }

        let tag = parse_start_tag(&self.buf[start..=end], &self.entities, self.max_entity_depth)
            .map_err(|(kind, message)| LexError::new(kind, message, at))?;
        h.start_element(tag.name, &tag.attributes, at);
        if tag.is_empty {
            h.end_element(tag.name, at);
        } else {
            self.open.push(tag.name.to_string());
        }

        self.seen_root = true;
        self.pos = end + 1;
        Ok(Step::Advanced)
    }

    fn end_tag<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(end) = Scanner::new(&self.buf, start).find_byte(b'>') else {
            return Ok(Step::NeedMore("end tag"));
        };
        let at = self.position(start);

        let mut s = Scanner::new(&self.buf[..end], start + 2);
        let range = s.read_name();
        s.skip_whitespace();
        let (ns, ne) = match range {
            Some(range) if s.is_eof() => range,
            _ => {
                return Err(LexError::new(
                    LexErrorKind::Syntax,
                    "End tag : expected '>'",
                    at,
                ))
            }
        };

        let name = as_str(&self.buf[ns..ne], at)?;
        match self.open.last() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(LexError::new(
                    LexErrorKind::Syntax,
                    format!("Opening and ending tag mismatch: {} and {}", open, name),
                    at,
                ))
            }
            None => {
                return Err(LexError::new(
                    LexErrorKind::Syntax,
                    format!("Unexpected end tag : {}", name),
                    at,
                ))
            }
        }
        h.end_element(name, at);
        self.open.pop();
        self.pos = end + 1;
        Ok(Step::Advanced)
    }

    fn comment<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(end) = Scanner::new(&self.buf, start + 4).find_seq(b"-->") else {
            return Ok(Step::NeedMore("comment"));
        };
        let at = self.position(start);
        let text = as_str(&self.buf[start + 4..end], at)?;
        h.comment(text, at);
        self.pos = end + 3;
        Ok(Step::Advanced)
    }

    fn cdata<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(end) = Scanner::new(&self.buf, start + 9).find_seq(b"]]>") else {
            return Ok(Step::NeedMore("CDATA section"));
        };
        let at = self.position(start);
        if self.outside_root() {
            return Err(self.misplaced_content(at));
        }
        let text = as_str(&self.buf[start + 9..end], at)?;
        h.characters(&normalize_newlines(text), at);
        self.pos = end + 3;
        Ok(Step::Advanced)
    }

    fn processing_instruction<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        let Some(end) = Scanner::new(&self.buf, start + 2).find_seq(b"?>") else {
            return Ok(Step::NeedMore("processing instruction"));
        };
        let at = self.position(start);

        let mut s = Scanner::new(&self.buf[..end], start + 2);
        let Some((ts, te)) = s.read_name() else {
            return Err(LexError::new(
                LexErrorKind::Syntax,
                "xmlParsePI : no target name",
                at,
            ));
        };
        let target = as_str(&self.buf[ts..te], at)?;
        if target.eq_ignore_ascii_case("xml") {
            // Encoding was settled by the converter; the declaration itself is skipped
            if !(self.allow_xml_decl && self.consumed + start == 0) {
                return Err(LexError::new(
                    LexErrorKind::Syntax,
                    "XML declaration allowed only at the start of the document",
                    at,
                ));
            }
        } else {
            s.skip_whitespace();
            let data = as_str(&self.buf[s.position()..end], at)?;
            h.processing_instruction(target, data, at);
        }
        self.pos = end + 2;
        Ok(Step::Advanced)
    }

    fn doctype<H: ScanHandler + ?Sized>(&mut self, h: &mut H) -> Result<Step, LexError> {
        let start = self.pos;
        if self.mode == LexMode::Fragment || self.seen_root || self.seen_doctype {
            let at = self.position(start);
            return Err(LexError::new(
                LexErrorKind::Syntax,
                "DOCTYPE is not allowed here",
                at,
            ));
        }
        let Some((end, subset)) = scan_doctype(&self.buf, start + 9) else {
            return Ok(Step::NeedMore("DOCTYPE"));
        };
        let at = self.position(start);

        let decl = as_str(&self.buf[start + 9..end], at)?;
        let name = decl
            .trim_start()
            .split(|c: char| c.is_ascii_whitespace() || c == '[')
            .next()
            .unwrap_or_default();
        if name.is_empty() {
            return Err(LexError::new(
                LexErrorKind::Syntax,
                "xmlParseDocTypeDecl : no DOCTYPE name !",
                at,
            ));
        }

        let table = match subset {
            Some((from, to)) => {
                let subset = as_str(&self.buf[from..to], at)?;
                dtd::parse_internal_subset(subset)
                    .map_err(|message| LexError::new(LexErrorKind::Syntax, message, at))?
            }
            None => EntityTable::new(),
        };
        self.entities = Arc::new(table);
        self.seen_doctype = true;
        h.doctype(name, &self.entities);
        self.pos = end + 1;
        Ok(Step::Advanced)
    }
}

/// Parse a complete start tag (`<` through `>`)
fn parse_start_tag<'a>(
    tag: &'a [u8],
    entities: &EntityTable,
    max_depth: usize,
) -> Result<StartTag<'a>, TagError> {
    let mut s = Scanner::new(tag, 1);
    let (ns, ne) = s
        .read_name()
        .ok_or((LexErrorKind::Syntax, "StartTag: invalid element name".to_string()))?;
    let name = tag_str(&tag[ns..ne])?;
    let mut attributes: Vec<RawAttribute<'a>> = Vec::new();

    loop {
        let before = s.position();
        s.skip_whitespace();
        match s.peek() {
            Some(b'>') => {
                return Ok(StartTag {
                    name,
                    attributes,
                    is_empty: false,
                })
            }
            Some(b'/') if s.peek_at(1) == Some(b'>') => {
                return Ok(StartTag {
                    name,
                    attributes,
                    is_empty: true,
                })
            }
            Some(c) if is_name_start_char(c) && s.position() > before => {}
            _ => {
                return Err((
                    LexErrorKind::Syntax,
                    format!("attributes construct error in element {}", name),
                ))
            }
        }

        let (as_, ae) = s.read_name().ok_or((
            LexErrorKind::Syntax,
            format!("attributes construct error in element {}", name),
        ))?;
        let attr_name = tag_str(&tag[as_..ae])?;
        s.skip_whitespace();
        if s.peek() != Some(b'=') {
            return Err((
                LexErrorKind::Syntax,
                format!("Specification mandates value for attribute {}", attr_name),
            ));
        }
        s.advance(1);
        s.skip_whitespace();

        let quote = match s.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                return Err((
                    LexErrorKind::Syntax,
                    "AttValue: \" or ' expected".to_string(),
                ))
            }
        };
        s.advance(1);
        let value_start = s.position();
        let value_end = s.find_byte(quote).ok_or((
            LexErrorKind::Syntax,
            "AttValue: ' expected".to_string(),
        ))?;
        let raw = &tag[value_start..value_end];
        if memchr(b'<', raw).is_some() {
            return Err((
                LexErrorKind::Syntax,
                "Unescaped '<' not allowed in attributes values".to_string(),
            ));
        }
        let value = entities::normalize_attribute_value(tag_str(raw)?, entities, max_depth)
            .map_err(|e| (LexErrorKind::Entity, e.to_string()))?;

        if attributes.iter().any(|a| a.name == attr_name) {
            return Err((
                LexErrorKind::Syntax,
                format!("Attribute {} redefined", attr_name),
            ));
        }
        attributes.push(RawAttribute {
            name: attr_name,
            value,
        });
        s.set_position(value_end + 1);
    }
}

/// Find the closing `>` of a DOCTYPE, skipping quoted literals and the
/// internal subset. Returns the index of `>` and the subset's byte range.
fn scan_doctype(buf: &[u8], from: usize) -> Option<(usize, Option<(usize, usize)>)> {
    let mut quote: Option<u8> = None;
    let mut subset_start: Option<usize> = None;
    let mut subset: Option<(usize, usize)> = None;
    let mut i = from;

    while i < buf.len() {
        let b = buf[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' if subset_start.is_none() => subset_start = Some(i + 1),
                b'<' if subset_start.is_some() && subset.is_none() && buf[i..].starts_with(b"<!--") => {
                    let close = memmem::find(&buf[i + 4..], b"-->")?;
                    i += 4 + close + 3;
                    continue;
                }
                b']' if subset.is_none() => {
                    if let Some(s) = subset_start {
                        subset = Some((s, i));
                    }
                }
                b'>' if subset_start.is_none() || subset.is_some() => return Some((i, subset)),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Length of the longest prefix that does not end inside a UTF-8 sequence
fn utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => bytes.len(),
    }
}

#[inline]
fn as_str(bytes: &[u8], at: TextPosition) -> Result<&str, LexError> {
    std::str::from_utf8(bytes).map_err(|_| {
        LexError::new(
            LexErrorKind::Encoding,
            "Input is not proper UTF-8, indicate encoding !",
            at,
        )
    })
}

#[inline]
fn tag_str(bytes: &[u8]) -> Result<&str, TagError> {
    std::str::from_utf8(bytes).map_err(|_| {
        (
            LexErrorKind::Encoding,
            "Input is not proper UTF-8, indicate encoding !".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Start(String, Vec<(String, String)>),
        End(String),
        Text(String),
        Pi(String, String),
        Comment(String),
    }

    #[derive(Default)]
    struct Collect {
        events: Vec<Ev>,
        positions: Vec<TextPosition>,
    }

    impl ScanHandler for Collect {
        fn start_element(&mut self, name: &str, attrs: &[RawAttribute<'_>], at: TextPosition) {
            let attrs = attrs
                .iter()
                .map(|a| (a.name.to_string(), a.value.to_string()))
                .collect();
            self.events.push(Ev::Start(name.to_string(), attrs));
            self.positions.push(at);
        }

        fn end_element(&mut self, name: &str, _at: TextPosition) {
            self.events.push(Ev::End(name.to_string()));
        }

        fn characters(&mut self, text: &str, _at: TextPosition) {
            // Merge adjacent runs to make assertions independent of chunking
            if let Some(Ev::Text(prev)) = self.events.last_mut() {
                prev.push_str(text);
            } else {
                self.events.push(Ev::Text(text.to_string()));
            }
        }

        fn comment(&mut self, text: &str, _at: TextPosition) {
            self.events.push(Ev::Comment(text.to_string()));
        }

        fn processing_instruction(&mut self, target: &str, data: &str, _at: TextPosition) {
            self.events.push(Ev::Pi(target.to_string(), data.to_string()));
        }
    }

    fn lex_chunks(chunks: &[&[u8]]) -> Result<Collect, LexError> {
        let mut lexer = Lexer::new(LexMode::Document);
        let mut collect = Collect::default();
        for chunk in chunks {
            lexer.feed(chunk, &mut collect)?;
        }
        lexer.finish(&mut collect)?;
        Ok(collect)
    }

    fn lex(input: &str) -> Result<Vec<Ev>, LexError> {
        lex_chunks(&[input.as_bytes()]).map(|c| c.events)
    }

    fn start(name: &str, attrs: &[(&str, &str)]) -> Ev {
        Ev::Start(
            name.to_string(),
            attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    fn end(name: &str) -> Ev {
        Ev::End(name.to_string())
    }

    fn text(t: &str) -> Ev {
        Ev::Text(t.to_string())
    }

    #[test]
    fn test_simple_document() {
        let events = lex(r#"<?xml version="1.0"?><a><b x="1"/>text</a>"#).unwrap();
        assert_eq!(
            events,
            vec![start("a", &[]), start("b", &[("x", "1")]), end("b"), text("text"), end("a")]
        );
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let input = "<?xml version='1.0'?>\n<!-- c --><r a='1 &amp; 2'>x&lt;y<![CDATA[<z>]]>é<e/></r>\n";
        let whole = lex(input).unwrap();
        let chunks: Vec<&[u8]> = input.as_bytes().chunks(1).collect();
        let split = lex_chunks(&chunks).unwrap().events;
        assert_eq!(whole, split);
        assert_eq!(whole[2], text("x<y<z>é"));
    }

    #[test]
    fn test_positions() {
        let collect = lex_chunks(&[b"<a>\n  <b/>\n</a>"]).unwrap();
        assert_eq!(collect.positions, vec![TextPosition::new(1, 1), TextPosition::new(2, 3)]);
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = lex("<a>\n<b></c></a>").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::Syntax);
        assert!(err.message.contains("mismatch"));
        assert_eq!(err.position, TextPosition::new(2, 4));
    }

    #[test]
    fn test_unclosed_element() {
        let err = lex("<a><b>").unwrap_err();
        assert_eq!(err.message, "Premature end of data in tag b");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(lex("  ").unwrap_err().message, "Document is empty");
    }

    #[test]
    fn test_content_outside_root() {
        assert!(lex("hello<a/>").is_err());
        assert!(lex("<a/><b/>").is_err());
        assert!(lex("<a/>tail").is_err());
        assert!(lex("<a/>\n<!-- ok -->\n").is_ok());
    }

    #[test]
    fn test_attribute_errors() {
        assert!(lex(r#"<a x="1" x="2"/>"#).unwrap_err().message.contains("redefined"));
        assert!(lex(r#"<a x="<"/>"#).is_err());
        assert!(lex(r#"<a x="1"y="2"/>"#).is_err());
        assert!(lex(r#"<a x/>"#).is_err());
    }

    #[test]
    fn test_attribute_normalization() {
        let events = lex("<a x='1\n2' y=\"&#9;\"/>").unwrap();
        assert_eq!(events[0], start("a", &[("x", "1 2"), ("y", "\t")]));
    }

    #[test]
    fn test_undefined_entity() {
        let err = lex("<a>&nope;</a>").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::Entity);
    }

    #[test]
    fn test_internal_entity_with_markup() {
        let input = r#"<!DOCTYPE doc [
            <!ENTITY who "<b>World</b>">
            <!ENTITY greet "Hello, &who;!">
        ]><doc>&greet;</doc>"#;
        let events = lex(input).unwrap();
        assert_eq!(
            events,
            vec![
                start("doc", &[]),
                text("Hello, "),
                start("b", &[]),
                text("World"),
                end("b"),
                text("!"),
                end("doc"),
            ]
        );
    }

    #[test]
    fn test_unbalanced_entity_rejected() {
        let input = r#"<!DOCTYPE a [<!ENTITY close "</a>">]><a>&close;"#;
        assert!(lex(input).is_err());
    }

    #[test]
    fn test_xml_declaration_not_at_start() {
        let err = lex(" <?xml version='1.0'?><a/>").unwrap_err();
        assert!(err.message.contains("XML declaration"));
    }

    #[test]
    fn test_pi_and_comment() {
        let events = lex("<a><?target some data?><!--note--></a>").unwrap();
        assert_eq!(
            events[1..3],
            [Ev::Pi("target".into(), "some data".into()), Ev::Comment("note".into())]
        );
    }

    #[test]
    fn test_crlf_normalized() {
        let chunks: [&[u8]; 2] = [b"<a>x\r", b"\ny</a>"];
        let events = lex_chunks(&chunks).unwrap().events;
        assert_eq!(events[1], text("x\ny"));
    }

    #[test]
    fn test_fragment_mode() {
        let mut lexer = Lexer::new(LexMode::Fragment);
        let mut collect = Collect::default();
        lexer.feed(b"<?xml encoding='UTF-8'?>text<i/>more", &mut collect).unwrap();
        lexer.finish(&mut collect).unwrap();
        assert_eq!(
            collect.events,
            vec![text("text"), start("i", &[]), end("i"), text("more")]
        );
    }

    #[test]
    fn test_halted_after_error() {
        let mut lexer = Lexer::new(LexMode::Document);
        let mut collect = Collect::default();
        assert!(lexer.feed(b"<a></b>", &mut collect).is_err());
        assert!(lexer.is_halted());
        assert!(lexer.feed(b"<c/>", &mut collect).is_ok());
        assert_eq!(collect.events, vec![start("a", &[])]);
    }
}
