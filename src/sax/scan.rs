//! Scan Engine
//!
//! Drives the lexer over the input and turns its callbacks into
//! [`EventRecord`]s: namespace declarations are applied, names are resolved
//! to tokens and character data is merged into one record per text node.
//! Records go to an [`EventSink`], which is either the dispatcher itself
//! (single-threaded) or a [`ChannelSink`] feeding the dispatching thread.
//!
//! Once an error is pending the engine emits a single `Exception` record and
//! nothing after it, but keeps scanning until the lexer halts or the input
//! ends.

use std::io;
use std::mem;
use std::sync::Arc;

use super::attributes::AttributeList;
use super::channel::{Batch, EventChannel};
use super::config::ParserConfig;
use super::entity::ParseEntity;
use super::error::{ParseError, ParseErrorKind};
use super::events::{ElementName, EventRecord};
use super::handler::EntityResolver;
use super::namespace::NamespaceBinding;
use super::tokens::{combine, Token, TokenCache, TokenResolver, TOKEN_UNKNOWN};
use crate::core::dtd::{EntityDecl, EntityTable};
use crate::core::lexer::{LexError, LexErrorKind, LexMode, Lexer, RawAttribute, ScanHandler};
use crate::core::position::TextPosition;
use crate::reader::{ChunkError, ChunkReader};

/// Where the scan engine sends records
pub trait EventSink {
    fn emit(&mut self, record: EventRecord);

    /// Push out anything buffered
    fn flush(&mut self) {}

    /// True when nobody will look at further records
    fn is_closed(&self) -> bool {
        false
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    #[inline]
    fn emit(&mut self, record: EventRecord) {
        (**self).emit(record)
    }

    #[inline]
    fn flush(&mut self) {
        (**self).flush()
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Fills batches and hands them to an [`EventChannel`]
pub struct ChannelSink {
    channel: Arc<EventChannel>,
    batch: Batch,
    open: bool,
}

impl ChannelSink {
    pub fn new(channel: Arc<EventChannel>) -> Self {
        let batch = channel.take_batch();
        ChannelSink {
            channel,
            batch,
            open: true,
        }
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, record: EventRecord) {
        if !self.open {
            return;
        }
        self.batch.push(record);
        if self.batch.len() >= self.channel.batch_capacity() {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.open || self.batch.is_empty() {
            return;
        }
        let full = mem::replace(&mut self.batch, self.channel.take_batch());
        if !self.channel.produce(full) {
            log::debug!("event consumer went away; dropping further records");
            self.open = false;
        }
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

/// How a scan ended
#[derive(Debug)]
pub enum ScanStop {
    /// The input was consumed
    Finished,
    /// A parse error is pending
    Failed,
    /// The input stream failed
    Io(io::Error),
    /// The sink stopped accepting records
    Abandoned,
}

pub struct ScanEngine<'a, S: EventSink> {
    config: &'a ParserConfig,
    tokens: TokenCache<'a>,
    entity_resolver: Option<&'a dyn EntityResolver>,
    entity: ParseEntity,
    /// Entities suspended while an external entity is scanned
    parents: Vec<ParseEntity>,
    sink: S,
    text: String,
    text_at: TextPosition,
    /// Entities declared by the document, shared with nested lexers
    dtd: Arc<EntityTable>,
    suppressed: bool,
    last_at: TextPosition,
}

impl<'a, S: EventSink> ScanEngine<'a, S> {
    pub fn new(
        config: &'a ParserConfig,
        resolver: &'a dyn TokenResolver,
        entity_resolver: Option<&'a dyn EntityResolver>,
        entity: ParseEntity,
        sink: S,
    ) -> Self {
        ScanEngine {
            config,
            tokens: TokenCache::new(resolver, config.token_cache_capacity),
            entity_resolver,
            entity,
            parents: Vec::new(),
            sink,
            text: String::new(),
            text_at: TextPosition::START,
            dtd: Arc::new(EntityTable::new()),
            suppressed: false,
            last_at: TextPosition::START,
        }
    }

    #[inline]
    pub fn entity(&self) -> &ParseEntity {
        &self.entity
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Scan a whole document. Ends the record stream with `Done`, or with
    /// `Exception` if the scan failed.
    pub fn run(&mut self, reader: &mut ChunkReader) -> io::Result<()> {
        let mut lexer = Lexer::new(LexMode::Document).with_max_entity_depth(self.config.max_entity_depth);
        let result = match self.drive(reader, &mut lexer) {
            ScanStop::Io(err) => {
                log::debug!("input failed at {}: {}", self.last_at, err);
                self.raise_exception();
                Err(err)
            }
            ScanStop::Finished | ScanStop::Failed | ScanStop::Abandoned => Ok(()),
        };

        self.flush_text();
        self.emit(EventRecord::Done);
        self.sink.flush();

        let (hits, misses) = self.tokens.stats();
        log::debug!("scan complete: {} token lookups memoized, {} resolved", hits, misses);
        result
    }

    /// Feed `reader` to `lexer` chunk by chunk
    fn drive(&mut self, reader: &mut ChunkReader, lexer: &mut Lexer) -> ScanStop {
        loop {
            if self.sink.is_closed() {
                return ScanStop::Abandoned;
            }
            let chunk = match reader.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(ChunkError::Io(err)) => return ScanStop::Io(err),
                Err(ChunkError::Encoding(message)) => {
                    let err = self.entity.error(ParseErrorKind::Encoding, message, self.last_at);
                    self.fail(err);
                    return ScanStop::Failed;
                }
            };
            if let Err(err) = lexer.feed(chunk, self) {
                self.lex_failed(err);
                return ScanStop::Failed;
            }
            self.poll_pending();
        }

        if let Err(err) = lexer.finish(self) {
            self.lex_failed(err);
            return ScanStop::Failed;
        }
        self.poll_pending();
        ScanStop::Finished
    }

    fn poll_pending(&mut self) {
        if !self.suppressed && self.entity.pending.is_set() {
            self.raise_exception();
        }
    }

    fn lex_failed(&mut self, err: LexError) {
        if err.kind == LexErrorKind::Aborted {
            return;
        }
        let err = ParseError::from(err)
            .with_ids(self.entity.system_id.as_deref(), self.entity.public_id.as_deref());
        self.fail(err);
    }

    fn fail(&mut self, err: ParseError) {
        self.entity.pending.capture(err);
        self.raise_exception();
    }

    /// Emit the one `Exception` record and stop emitting
    fn raise_exception(&mut self) {
        if self.suppressed {
            return;
        }
        self.text.clear();
        self.sink.emit(EventRecord::Exception);
        self.sink.flush();
        self.suppressed = true;
    }

    /// Inline dispatch runs handlers inside `emit`, so a handler error is
    /// visible at once and the `Exception` record follows the record that
    /// caused it. A threaded scan polls once per chunk instead.
    #[inline]
    fn emit(&mut self, record: EventRecord) {
        if self.suppressed {
            return;
        }
        let terminal = matches!(record, EventRecord::Done | EventRecord::Exception);
        self.sink.emit(record);
        if !terminal && !self.entity.is_threaded() {
            self.poll_pending();
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = mem::take(&mut self.text);
        let at = self.text_at;
        self.emit(EventRecord::Characters { text, at });
    }

    /// Apply the `xmlns` declarations and resolve the element and attribute
    /// names. Fails with the message for the first unbound prefix.
    fn resolve_start(&mut self, name: &str, attrs: &[RawAttribute<'_>]) -> Result<(ElementName, AttributeList), String> {
        let namespaces = &mut self.entity.namespaces;
        for attr in attrs {
            if let Some(prefix) = namespace_declaration(attr.name) {
                namespaces.declare(prefix, &attr.value);
            }
        }

        let mut failure = None;
        let mut attributes = AttributeList::new();
        for attr in attrs {
            if namespace_declaration(attr.name).is_some() {
                continue;
            }
            let (prefix, local) = split_qname(attr.name);
            let binding = match prefix {
                Some(prefix) => match namespaces.resolve_prefix(prefix) {
                    Some(binding) => Some(binding),
                    None => {
                        failure.get_or_insert_with(|| unbound(prefix));
                        continue;
                    }
                },
                None => None,
            };
            let token = qualified_token(&mut self.tokens, binding, local);
            if token == TOKEN_UNKNOWN {
                let uri = binding.map(|b| b.uri.as_str()).unwrap_or_default();
                attributes.push_unknown(uri, local, attr.value.as_ref());
            } else {
                attributes.push(token, attr.value.as_ref());
            }
        }

        let (prefix, local) = split_qname(name);
        let binding = match prefix {
            Some(prefix) => match namespaces.resolve_prefix(prefix) {
                Some(binding) => Some(binding),
                None => return Err(failure.unwrap_or_else(|| unbound(prefix))),
            },
            None => namespaces.default_namespace(),
        };
        if let Some(message) = failure {
            return Err(message);
        }

        let token = qualified_token(&mut self.tokens, binding, local);
        let element = if token == TOKEN_UNKNOWN {
            ElementName::Unknown {
                namespace: binding.map(|b| b.uri.clone()).unwrap_or_default(),
                local_name: local.to_string(),
            }
        } else {
            ElementName::Token(token)
        };
        Ok((element, attributes))
    }

    /// Scan an external parsed entity in place of its reference. Returns
    /// false if the nested scan failed with the error already captured.
    fn scan_external(&mut self, name: &str, decl: &EntityDecl, at: TextPosition) -> Result<bool, ParseError> {
        let Some(resolver) = self.entity_resolver else {
            log::warn!("no entity resolver set; skipping external entity '{}'", name);
            return Ok(true);
        };
        let system_id = decl.system_id.clone().unwrap_or_default();

        if self.parents.len() >= self.config.max_entity_depth {
            return Err(self.entity.error(
                ParseErrorKind::Entity,
                format!("Maximum entity nesting depth exceeded at '{}'", name),
                at,
            ));
        }
        let looping = self
            .parents
            .iter()
            .chain(std::iter::once(&self.entity))
            .any(|e| e.system_id.as_deref() == Some(system_id.as_str()));
        if looping {
            return Err(self.entity.error(
                ParseErrorKind::Entity,
                format!("Detected an entity reference loop in '{}'", name),
                at,
            ));
        }

        let mut source = match resolver.resolve_entity(decl.public_id.as_deref(), &system_id) {
            Ok(Some(source)) => source,
            Ok(None) => {
                log::debug!("entity resolver skipped '{}' ({})", name, system_id);
                return Ok(true);
            }
            Err(cause) => {
                let mut err = self.entity.error(
                    ParseErrorKind::Entity,
                    format!("Failed to resolve entity '{}': {}", name, cause),
                    at,
                );
                err.source = Some(cause);
                return Err(err);
            }
        };
        let Some(stream) = source.take_stream() else {
            return Err(self.entity.error(
                ParseErrorKind::Entity,
                format!("Entity '{}' resolved to a source without input", name),
                at,
            ));
        };
        let mut reader = ChunkReader::new(stream, source.encoding(), self.config.read_chunk_size)
            .map_err(|e| self.entity.error(ParseErrorKind::Encoding, e.to_string(), at))?;

        let nested = self.entity.nested(
            Some(source.system_id().map(str::to_string).unwrap_or(system_id)),
            source.public_id().map(str::to_string).or_else(|| decl.public_id.clone()),
        );
        log::debug!(
            "entering external entity '{}' ({})",
            name,
            nested.system_id.as_deref().unwrap_or_default()
        );
        let parent = mem::replace(&mut self.entity, nested);
        self.parents.push(parent);

        let mut lexer = Lexer::new(LexMode::Fragment)
            .with_entities(Arc::clone(&self.dtd))
            .with_max_entity_depth(self.config.max_entity_depth);
        let stop = self.drive(&mut reader, &mut lexer);

        if let Some(parent) = self.parents.pop() {
            self.entity = parent;
        }
        match stop {
            ScanStop::Io(cause) => Err(self.entity.error(
                ParseErrorKind::Entity,
                format!("I/O error reading entity '{}': {}", name, cause),
                at,
            )),
            ScanStop::Failed => Ok(false),
            ScanStop::Finished | ScanStop::Abandoned => Ok(true),
        }
    }
}

impl<S: EventSink> ScanHandler for ScanEngine<'_, S> {
    fn start_element(&mut self, name: &str, attrs: &[RawAttribute<'_>], at: TextPosition) {
        self.last_at = at;
        self.flush_text();
        self.entity.namespaces.open_scope();
        if self.suppressed {
            return;
        }

        match self.resolve_start(name, attrs) {
            Ok((element, attributes)) => {
                let namespaces: Vec<NamespaceBinding> = self.entity.namespaces.declared_in_scope().to_vec();
                self.emit(EventRecord::StartElement {
                    name: element,
                    attributes,
                    namespaces,
                    at,
                });
            }
            Err(message) => {
                let err = self.entity.error(ParseErrorKind::Namespace, message, at);
                self.fail(err);
            }
        }
    }

    fn end_element(&mut self, _name: &str, at: TextPosition) {
        self.last_at = at;
        self.flush_text();
        self.entity.namespaces.close_scope();
        self.emit(EventRecord::EndElement { at });
    }

    fn characters(&mut self, text: &str, at: TextPosition) {
        if self.suppressed || text.is_empty() {
            return;
        }
        if self.text.is_empty() {
            self.text_at = at;
        }
        self.text.push_str(text);
    }

    fn doctype(&mut self, _name: &str, entities: &Arc<EntityTable>) {
        self.dtd = Arc::clone(entities);
    }

    fn external_entity(&mut self, name: &str, decl: &EntityDecl, at: TextPosition) -> Result<(), LexError> {
        self.last_at = at;
        match self.scan_external(name, decl, at) {
            Ok(true) => Ok(()),
            Ok(false) => Err(LexError::aborted(at)),
            Err(err) => {
                self.fail(err);
                Err(LexError::aborted(at))
            }
        }
    }
}

/// The prefix an `xmlns` attribute declares, `""` for the default namespace
fn namespace_declaration(name: &str) -> Option<&str> {
    if name == "xmlns" {
        Some("")
    } else {
        name.strip_prefix("xmlns:")
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn unbound(prefix: &str) -> String {
    format!("No namespace defined for {}", prefix)
}

fn qualified_token(tokens: &mut TokenCache<'_>, binding: Option<&NamespaceBinding>, local: &str) -> Token {
    let name = tokens.resolve(local.as_bytes());
    match binding {
        Some(binding) => combine(binding.token, name),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::InputSource;
    use crate::sax::entity::PendingError;
    use crate::sax::error::BoxError;
    use crate::sax::namespace::{NamespaceContext, NamespaceRegistry};
    use crate::sax::tokens::TokenTable;
    use std::io::Cursor;

    const NS_A: Token = 0x1_0000;

    #[derive(Default)]
    struct Collect(Vec<EventRecord>);

    impl EventSink for Collect {
        fn emit(&mut self, record: EventRecord) {
            self.0.push(record);
        }
    }

    fn tokens() -> TokenTable {
        [("a", 5), ("b", 6), ("x", 7)].into_iter().collect()
    }

    fn registry() -> Arc<NamespaceRegistry> {
        let mut registry = NamespaceRegistry::new();
        registry.register("urn:a", NS_A).unwrap();
        Arc::new(registry)
    }

    fn scan_with(
        xml: &str,
        config: &ParserConfig,
        resolver: Option<&dyn EntityResolver>,
    ) -> (Vec<EventRecord>, Option<ParseError>) {
        let table = tokens();
        let pending = PendingError::new();
        let entity = ParseEntity::new(
            Some("doc.xml".into()),
            None,
            NamespaceContext::new(registry()),
            pending.clone(),
            false,
        );
        let mut reader = ChunkReader::new(Box::new(Cursor::new(xml.as_bytes().to_vec())), None, config.read_chunk_size).unwrap();
        let mut engine = ScanEngine::new(config, &table, resolver, entity, Collect::default());
        engine.run(&mut reader).unwrap();
        (engine.into_sink().0, pending.take())
    }

    fn scan(xml: &str) -> (Vec<EventRecord>, Option<ParseError>) {
        scan_with(xml, &ParserConfig::default(), None)
    }

    fn names(records: &[EventRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| match r {
                EventRecord::StartElement { name, .. } => format!("start:{:?}", name.token()),
                EventRecord::EndElement { .. } => "end".to_string(),
                EventRecord::Characters { text, .. } => format!("text:{}", text),
                EventRecord::Done => "done".to_string(),
                EventRecord::Exception => "exception".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_simple_records() {
        let (records, err) = scan(r#"<a><b x="1"/>text</a>"#);
        assert!(err.is_none());
        assert_eq!(
            names(&records),
            vec!["start:5", "start:6", "end", "text:text", "end", "done"]
        );
        match &records[1] {
            EventRecord::StartElement { attributes, .. } => {
                assert_eq!(attributes.value(7), Some("1"));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    /// Captures a handler error on the first start of `fail_on`
    struct FailingSink {
        records: Vec<EventRecord>,
        pending: PendingError,
        fail_on: Token,
    }

    impl EventSink for FailingSink {
        fn emit(&mut self, record: EventRecord) {
            if let EventRecord::StartElement { name, at, .. } = &record {
                if name.token() == self.fail_on {
                    self.pending
                        .capture(ParseError::new(ParseErrorKind::Handler, "rejected", *at));
                }
            }
            self.records.push(record);
        }
    }

    fn scan_failing(xml: &str, threaded: bool) -> Vec<String> {
        let table = tokens();
        let config = ParserConfig::default();
        let pending = PendingError::new();
        let entity = ParseEntity::new(None, None, NamespaceContext::new(registry()), pending.clone(), threaded);
        let sink = FailingSink {
            records: Vec::new(),
            pending: pending.clone(),
            fail_on: 6,
        };
        let mut reader = ChunkReader::new(Box::new(Cursor::new(xml.as_bytes().to_vec())), None, config.read_chunk_size).unwrap();
        let mut engine = ScanEngine::new(&config, &table, None, entity, sink);
        engine.run(&mut reader).unwrap();
        assert_eq!(pending.take().unwrap().message, "rejected");
        names(&engine.into_sink().records)
    }

    #[test]
    fn test_inline_exception_follows_failing_record() {
        let xml = "<a><b/>tail</a>";
        assert_eq!(scan_failing(xml, false), vec!["start:5", "start:6", "exception"]);
        // Threaded scans notice the error at the end of the chunk
        let threaded = scan_failing(xml, true);
        assert_eq!(threaded[..4], ["start:5", "start:6", "end", "text:tail"]);
        assert_eq!(threaded.last().map(String::as_str), Some("exception"));
        assert!(!threaded.contains(&"done".to_string()));
    }

    #[test]
    fn test_characters_merged_across_chunks_and_references() {
        let config = ParserConfig::default().with_read_chunk_size(3);
        let (records, _) = scan_with("<a>one &amp; <![CDATA[two]]> three</a>", &config, None);
        assert_eq!(names(&records), vec!["start:5", "text:one & two three", "end", "done"]);
    }

    #[test]
    fn test_namespaced_names() {
        let (records, err) = scan(r#"<p:a xmlns:p="urn:a" p:x="1" y="2"><b xmlns="urn:a"/></p:a>"#);
        assert!(err.is_none());
        match &records[0] {
            EventRecord::StartElement {
                name,
                attributes,
                namespaces,
                ..
            } => {
                assert_eq!(*name, ElementName::Token(NS_A | 5));
                assert_eq!(attributes.value(NS_A | 7), Some("1"));
                assert_eq!(attributes.unknown()[0].name, "y");
                assert_eq!(attributes.unknown()[0].namespace, "");
                assert_eq!(namespaces.len(), 1);
                assert_eq!(namespaces[0].prefix, "p");
            }
            other => panic!("unexpected record {:?}", other),
        }
        match &records[1] {
            EventRecord::StartElement { name, .. } => assert_eq!(*name, ElementName::Token(NS_A | 6)),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_unknown_element_keeps_parts() {
        let (records, _) = scan(r#"<zz xmlns="urn:unregistered"/>"#);
        match &records[0] {
            EventRecord::StartElement { name, .. } => assert_eq!(
                *name,
                ElementName::Unknown {
                    namespace: "urn:unregistered".into(),
                    local_name: "zz".into(),
                }
            ),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_unbound_prefix_fails_at_element() {
        let (records, err) = scan("<a>\n  <q:b/>\n</a>");
        assert_eq!(names(&records), vec!["start:5", "text:\n  ", "exception"]);
        let err = err.unwrap();
        assert_eq!(err.kind, ParseErrorKind::Namespace);
        assert_eq!(err.message, "No namespace defined for q");
        assert_eq!((err.line(), err.column()), (2, 3));
        assert_eq!(err.system_id.as_deref(), Some("doc.xml"));
    }

    #[test]
    fn test_syntax_error_ends_with_exception() {
        let (records, err) = scan("<a><b></a>");
        assert_eq!(records.last(), Some(&EventRecord::Exception));
        assert_eq!(records.iter().filter(|r| r.is_terminal()).count(), 1);
        assert_eq!(err.unwrap().kind, ParseErrorKind::Syntax);
    }

    struct MapResolver(&'static str, &'static str);

    impl EntityResolver for MapResolver {
        fn resolve_entity(&self, _public_id: Option<&str>, system_id: &str) -> Result<Option<InputSource>, BoxError> {
            if system_id == self.0 {
                Ok(Some(InputSource::from_bytes(self.1).with_system_id(system_id)))
            } else {
                Err(format!("unknown entity {}", system_id).into())
            }
        }
    }

    #[test]
    fn test_external_entity_is_scanned_in_place() {
        let xml = r#"<!DOCTYPE a [<!ENTITY ext SYSTEM "ext.xml">]><a>&ext;</a>"#;
        let resolver = MapResolver("ext.xml", "<b x='1'/>tail");
        let (records, err) = scan_with(xml, &ParserConfig::default(), Some(&resolver));
        assert!(err.is_none());
        assert_eq!(names(&records), vec!["start:5", "start:6", "end", "text:tail", "end", "done"]);
    }

    #[test]
    fn test_external_entity_resolver_error() {
        let xml = r#"<!DOCTYPE a [<!ENTITY ext SYSTEM "missing.xml">]><a>&ext;</a>"#;
        let resolver = MapResolver("ext.xml", "");
        let (records, err) = scan_with(xml, &ParserConfig::default(), Some(&resolver));
        assert_eq!(records.last(), Some(&EventRecord::Exception));
        let err = err.unwrap();
        assert_eq!(err.kind, ParseErrorKind::Entity);
        assert!(err.source.is_some());
    }

    #[test]
    fn test_external_entity_loop() {
        let xml = r#"<!DOCTYPE a [<!ENTITY ext SYSTEM "ext.xml">]><a>&ext;</a>"#;
        let resolver = MapResolver("ext.xml", "<b>&ext;</b>");
        let (_, err) = scan_with(xml, &ParserConfig::default(), Some(&resolver));
        assert!(err.unwrap().message.contains("entity reference loop"));
    }

    #[test]
    fn test_external_entity_skipped_without_resolver() {
        let xml = r#"<!DOCTYPE a [<!ENTITY ext SYSTEM "ext.xml">]><a>&ext;</a>"#;
        let (records, err) = scan(xml);
        assert!(err.is_none());
        assert_eq!(names(&records), vec!["start:5", "end", "done"]);
    }

    #[test]
    fn test_channel_sink_batches() {
        let channel = Arc::new(EventChannel::new(2, 8, 4));
        let mut sink = ChannelSink::new(Arc::clone(&channel));
        for _ in 0..5 {
            sink.emit(EventRecord::EndElement { at: TextPosition::START });
        }
        assert_eq!(channel.pending_len(), 2);
        sink.flush();
        channel.close();

        let sizes: Vec<usize> = std::iter::from_fn(|| channel.consume()).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}
