//! Event Records
//!
//! The scan side of the pipeline turns lexer callbacks into records holding
//! just enough to replay the application callback later, on the dispatching
//! thread, together with the position of the construct.

use super::attributes::AttributeList;
use super::namespace::NamespaceBinding;
use super::tokens::{Token, TOKEN_UNKNOWN};
use crate::core::position::TextPosition;

/// An element name: its token, or the raw parts when it has none
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementName {
    Token(Token),
    Unknown {
        /// Namespace URI, empty when the element is in no namespace
        namespace: String,
        local_name: String,
    },
}

impl ElementName {
    /// The token, or [`TOKEN_UNKNOWN`]
    #[inline]
    pub fn token(&self) -> Token {
        match self {
            ElementName::Token(token) => *token,
            ElementName::Unknown { .. } => TOKEN_UNKNOWN,
        }
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        matches!(self, ElementName::Token(_))
    }
}

/// A recorded callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRecord {
    StartElement {
        name: ElementName,
        attributes: AttributeList,
        /// Namespaces declared on this element, for the dispatcher's mirror context
        namespaces: Vec<NamespaceBinding>,
        at: TextPosition,
    },
    EndElement {
        at: TextPosition,
    },
    /// Character data, merged over the whole text node
    Characters {
        text: String,
        at: TextPosition,
    },
    /// End of input
    Done,
    /// Scanning failed; the error is in the pending slot
    Exception,
}

impl EventRecord {
    /// Position of the construct, if the record has one
    pub fn position(&self) -> Option<TextPosition> {
        match self {
            EventRecord::StartElement { at, .. }
            | EventRecord::EndElement { at }
            | EventRecord::Characters { at, .. } => Some(*at),
            EventRecord::Done | EventRecord::Exception => None,
        }
    }

    /// True for records that end the stream
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventRecord::Done | EventRecord::Exception)
    }
}
