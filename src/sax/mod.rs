//! SAX (Simple API for XML) Module
//!
//! Event-based parsing with scanning decoupled from dispatch.
//!
//! ## Architecture
//!
//! ```text
//! Lexer ---> ScanEngine ---> [EventChannel] ---> DispatchEngine ---> handlers
//!               |                                      |
//!         NamespaceContext                      element contexts
//!         TokenResolver                         Locator
//! ```
//!
//! The scan side resolves names to tokens and records what the application
//! must see as [`EventRecord`]s. For large inputs it runs on its own thread
//! and hands records over in batches through a bounded channel; otherwise
//! records are dispatched as soon as they are made.
//!
//! ## Records
//!
//! - `StartElement` - element name, attributes, namespaces declared
//! - `EndElement`
//! - `Characters` - one per text node, references and CDATA merged in
//! - `Done` / `Exception` - end of the stream

pub mod attributes;
pub mod channel;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod events;
pub mod handler;
pub mod namespace;
pub mod parser;
pub mod scan;
pub mod tokens;

pub use attributes::{AttributeList, UnknownAttribute};
pub use channel::{ChannelObserver, EventChannel};
pub use collector::{Callback, RecordingHandler};
pub use config::{ParserConfig, ThreadingMode};
pub use error::{BoxError, ParseError, ParseErrorKind, SaxError};
pub use events::{ElementName, EventRecord};
pub use handler::{ContextHandler, DocumentHandler, EntityResolver, ErrorHandler, Locator};
pub use namespace::{NamespaceBinding, NamespaceContext, NamespaceRegistry, XML_NAMESPACE_URI};
pub use parser::FastParser;
pub use tokens::{Token, TokenResolver, TokenTable, NAMESPACE_TOKEN_BASE, TOKEN_UNKNOWN};
