//! Error Types
//!
//! Every failed parse surfaces exactly one error. Lexical problems, unbound
//! prefixes and errors returned by application handlers are all reported as
//! a [`ParseError`] carrying the position of the offending construct.

use thiserror::Error;

use super::tokens::Token;
use crate::core::lexer::{LexError, LexErrorKind};
use crate::core::position::TextPosition;

/// Error type application handlers return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Malformed markup
    Syntax,
    /// Undecodable input
    Encoding,
    /// Unbound namespace prefix
    Namespace,
    /// A handler returned an error
    Handler,
    /// Undefined, recursive or unresolvable entity
    Entity,
}

/// A failure tied to a location in the input
#[derive(Debug, Error)]
#[error("[{} line {}]: {}", .system_id.as_deref().unwrap_or(""), .position.line, .message)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    pub position: TextPosition,
    /// The application error, for `Handler` failures
    #[source]
    pub source: Option<BoxError>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, position: TextPosition) -> Self {
        ParseError {
            kind,
            message: message.into(),
            system_id: None,
            public_id: None,
            position,
            source: None,
        }
    }

    /// Wrap an error returned by an application handler
    pub fn handler(source: BoxError, position: TextPosition) -> Self {
        ParseError {
            message: source.to_string(),
            source: Some(source),
            ..ParseError::new(ParseErrorKind::Handler, String::new(), position)
        }
    }

    pub fn with_ids(mut self, system_id: Option<&str>, public_id: Option<&str>) -> Self {
        self.system_id = system_id.map(str::to_string);
        self.public_id = public_id.map(str::to_string);
        self
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.position.line
    }

    #[inline]
    pub fn column(&self) -> u32 {
        self.position.column
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        let kind = match err.kind {
            LexErrorKind::Encoding => ParseErrorKind::Encoding,
            LexErrorKind::Entity => ParseErrorKind::Entity,
            LexErrorKind::Syntax | LexErrorKind::Aborted => ParseErrorKind::Syntax,
        };
        ParseError::new(kind, err.message, err.position)
    }
}

/// Errors returned by the parser API
#[derive(Debug, Error)]
pub enum SaxError {
    #[error("{0}")]
    Configuration(String),

    #[error("Invalid Namespace token {token:#x} for '{uri}'")]
    InvalidNamespaceToken { uri: String, token: Token },

    #[error("Namespace URI '{0}' is already registered")]
    NamespaceAlreadyRegistered(String),

    #[error("The namespace with prefix '{0}' has not been declared")]
    UnboundPrefix(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The error handler rejected a parse error with an error of its own
    #[error("{0}")]
    ErrorHandler(#[source] BoxError),
}

impl SaxError {
    /// The parse error, if this is one
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            SaxError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let err = ParseError::new(ParseErrorKind::Syntax, "bad", TextPosition::new(3, 7))
            .with_ids(Some("doc.xml"), None);
        assert_eq!(err.to_string(), "[doc.xml line 3]: bad");
        assert_eq!((err.line(), err.column()), (3, 7));
    }

    #[test]
    fn test_message_without_system_id() {
        let err = ParseError::new(ParseErrorKind::Syntax, "bad", TextPosition::START);
        assert_eq!(err.to_string(), "[ line 1]: bad");
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let app: BoxError = "boom".into();
        let err = ParseError::handler(app, TextPosition::new(2, 1));
        assert_eq!(err.kind, ParseErrorKind::Handler);
        assert_eq!(err.message, "boom");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_lex_error() {
        let lex = LexError::new(LexErrorKind::Entity, "Entity 'x' not defined", TextPosition::new(1, 4));
        let err = ParseError::from(lex);
        assert_eq!(err.kind, ParseErrorKind::Entity);
        assert_eq!(err.position, TextPosition::new(1, 4));
    }
}
