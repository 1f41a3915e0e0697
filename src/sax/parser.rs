//! Fast SAX Parser
//!
//! [`FastParser`] ties the pipeline together. Small inputs are scanned and
//! dispatched on the calling thread; large ones are scanned on a scoped
//! worker thread while the calling thread dispatches:
//!
//! ```text
//!  worker:   ChunkReader -> Lexer -> ScanEngine -> ChannelSink
//!                                                      |
//!                                                 EventChannel
//!                                                      |
//!  caller:                    handlers <- DispatchEngine
//! ```
//!
//! Handlers see the same callbacks in the same order either way.

use std::io;
use std::sync::Arc;
use std::thread;

use super::channel::{ChannelObserver, CloseOnDrop, EventChannel};
use super::config::ParserConfig;
use super::dispatch::{DispatchEngine, Flow};
use super::entity::{ParseEntity, PendingError};
use super::error::{ParseError, SaxError};
use super::handler::{DiscardHandler, DocumentHandler, EntityResolver, ErrorHandler};
use super::namespace::{NamespaceContext, NamespaceRegistry};
use super::scan::{ChannelSink, ScanEngine};
use super::tokens::{Token, TokenResolver};
use crate::reader::{ChunkError, ChunkReader, InputSource};

/// Name of the scanning thread
const SCAN_THREAD_NAME: &str = "fastsax-scan";

pub struct FastParser {
    config: ParserConfig,
    tokens: Option<Arc<dyn TokenResolver>>,
    namespaces: NamespaceRegistry,
    document_handler: Option<Box<dyn DocumentHandler>>,
    error_handler: Option<Box<dyn ErrorHandler>>,
    entity_resolver: Option<Arc<dyn EntityResolver>>,
    observer: Option<Arc<dyn ChannelObserver>>,
}

impl Default for FastParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FastParser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        FastParser {
            config,
            tokens: None,
            namespaces: NamespaceRegistry::new(),
            document_handler: None,
            error_handler: None,
            entity_resolver: None,
            observer: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ParserConfig {
        &mut self.config
    }

    pub fn set_token_resolver<R: TokenResolver + 'static>(&mut self, resolver: R) {
        self.tokens = Some(Arc::new(resolver));
    }

    /// Use a resolver shared with other parsers
    pub fn set_shared_token_resolver(&mut self, resolver: Arc<dyn TokenResolver>) {
        self.tokens = Some(resolver);
    }

    /// Register the token for a namespace URI
    ///
    /// # Errors
    ///
    /// Fails if `token` is below [`NAMESPACE_TOKEN_BASE`](super::tokens::NAMESPACE_TOKEN_BASE)
    /// or `uri` was registered before.
    pub fn register_namespace(&mut self, uri: impl Into<String>, token: Token) -> Result<(), SaxError> {
        self.namespaces.register(uri, token)
    }

    /// Replace all namespace registrations
    pub fn set_namespace_registry(&mut self, registry: NamespaceRegistry) {
        self.namespaces = registry;
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    pub fn set_document_handler(&mut self, handler: Box<dyn DocumentHandler>) {
        self.document_handler = Some(handler);
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.error_handler = Some(handler);
    }

    pub fn set_entity_resolver(&mut self, resolver: Arc<dyn EntityResolver>) {
        self.entity_resolver = Some(resolver);
    }

    /// Observe backpressure on the event channel of threaded parses
    pub fn set_channel_observer(&mut self, observer: Arc<dyn ChannelObserver>) {
        self.observer = Some(observer);
    }

    /// Parse with the document handler set on the parser. Without one the
    /// document is checked and its callbacks discarded.
    pub fn parse(&mut self, source: InputSource) -> Result<(), SaxError> {
        match self.document_handler.take() {
            Some(mut handler) => {
                let result = self.parse_with_handler(source, handler.as_mut());
                self.document_handler = Some(handler);
                result
            }
            None => self.parse_with_handler(source, &mut DiscardHandler),
        }
    }

    /// Parse, delivering callbacks to `handler`
    ///
    /// Blocks until the document has been scanned and dispatched. Exactly
    /// one error is returned for a failed parse: the first one captured.
    pub fn parse_with_handler(
        &mut self,
        mut source: InputSource,
        handler: &mut dyn DocumentHandler,
    ) -> Result<(), SaxError> {
        let tokens = self
            .tokens
            .clone()
            .ok_or_else(|| SaxError::Configuration("No token resolver has been set".to_string()))?;
        let stream = source
            .take_stream()
            .ok_or_else(|| SaxError::Configuration("The input source has no byte stream".to_string()))?;
        let reader = ChunkReader::new(stream, source.encoding(), self.config.read_chunk_size).map_err(|e| match e {
            ChunkError::Io(e) => SaxError::Io(e),
            ChunkError::Encoding(message) => SaxError::Configuration(message),
        })?;

        let threaded = self.config.use_threads(source.available());
        log::debug!(
            "parsing {} ({} bytes available, {})",
            source.system_id().unwrap_or("<anonymous>"),
            source.available(),
            if threaded { "threaded" } else { "inline" }
        );

        let registry = Arc::new(self.namespaces.clone());
        let pending = PendingError::new();
        let mut dispatch = DispatchEngine::new(
            handler,
            Arc::clone(&registry),
            source.system_id(),
            source.public_id(),
            pending.clone(),
        );

        let scanned = if dispatch.start() == Flow::Stop {
            Ok(())
        } else {
            let scan = ScanRequest {
                config: &self.config,
                tokens: &*tokens,
                entity_resolver: self.entity_resolver.as_deref(),
                system_id: source.system_id().map(str::to_string),
                public_id: source.public_id().map(str::to_string),
                namespaces: NamespaceContext::new(registry),
                pending: pending.clone(),
                reader,
            };
            if threaded {
                scan.threaded(&mut dispatch, self.observer.clone())
            } else {
                scan.inline(&mut dispatch)
            }
        };
        dispatch.finish();

        scanned?;
        match pending.take() {
            Some(err) => Err(self.report(err)),
            None => Ok(()),
        }
    }

    /// Offer the error to the error handler, which may replace it
    fn report(&mut self, err: ParseError) -> SaxError {
        let Some(handler) = self.error_handler.as_mut() else {
            return SaxError::Parse(err);
        };
        match handler.fatal_error(&err) {
            Ok(()) => SaxError::Parse(err),
            Err(replacement) => {
                log::debug!("error handler replaced \"{}\"", err);
                SaxError::ErrorHandler(replacement)
            }
        }
    }
}

/// Everything the scanning side of one parse needs
struct ScanRequest<'p> {
    config: &'p ParserConfig,
    tokens: &'p dyn TokenResolver,
    entity_resolver: Option<&'p dyn EntityResolver>,
    system_id: Option<String>,
    public_id: Option<String>,
    namespaces: NamespaceContext,
    pending: PendingError,
    reader: ChunkReader,
}

impl<'p> ScanRequest<'p> {
    fn inline(self, dispatch: &mut DispatchEngine<'_>) -> io::Result<()> {
        let ScanRequest {
            config,
            tokens,
            entity_resolver,
            system_id,
            public_id,
            namespaces,
            pending,
            mut reader,
        } = self;
        let entity = ParseEntity::new(system_id, public_id, namespaces, pending, false);
        ScanEngine::new(config, tokens, entity_resolver, entity, dispatch).run(&mut reader)
    }

    fn threaded(
        self,
        dispatch: &mut DispatchEngine<'_>,
        observer: Option<Arc<dyn ChannelObserver>>,
    ) -> io::Result<()> {
        let ScanRequest {
            config,
            tokens,
            entity_resolver,
            system_id,
            public_id,
            namespaces,
            pending,
            mut reader,
        } = self;

        let mut channel = EventChannel::new(config.batch_capacity, config.high_water, config.low_water);
        if let Some(observer) = observer {
            channel = channel.with_observer(observer);
        }
        let channel = Arc::new(channel);
        let entity = ParseEntity::new(system_id, public_id, namespaces, pending, true);

        thread::scope(|scope| {
            let producer_channel = Arc::clone(&channel);
            let producer = thread::Builder::new()
                .name(SCAN_THREAD_NAME.to_string())
                .spawn_scoped(scope, move || {
                    let _close = CloseOnDrop(&producer_channel);
                    let sink = ChannelSink::new(Arc::clone(&producer_channel));
                    ScanEngine::new(config, tokens, entity_resolver, entity, sink).run(&mut reader)
                })?;

            dispatch.consume(&channel);
            match producer.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }
}
