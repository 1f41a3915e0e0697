//! Parse Entities
//!
//! A [`ParseEntity`] holds the mutable scan state of one document: its ids,
//! its namespace bindings and the way records leave it. External parsed
//! entities get a nested entity that starts from a copy of the parent's
//! namespace state and shares its error slot and threading mode.

use std::sync::{Arc, Mutex, PoisonError};

use super::error::{ParseError, ParseErrorKind};
use super::namespace::NamespaceContext;
use crate::core::position::TextPosition;

/// First-error slot shared by the scanning and dispatching sides
///
/// Only the first captured error is kept; later ones are logged and
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct PendingError {
    slot: Arc<Mutex<Option<ParseError>>>,
}

impl PendingError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless an error is already pending. Returns true if it
    /// was stored.
    pub fn capture(&self, err: ParseError) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::warn!("discarding error after the first: {}", err);
            return false;
        }
        log::debug!("parse error captured: {}", err);
        *slot = Some(err);
        true
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn take(&self) -> Option<ParseError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Scan state of one document or external entity
#[derive(Debug)]
pub struct ParseEntity {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    threaded: bool,
    pub namespaces: NamespaceContext,
    pub pending: PendingError,
}

impl ParseEntity {
    pub fn new(
        system_id: Option<String>,
        public_id: Option<String>,
        namespaces: NamespaceContext,
        pending: PendingError,
        threaded: bool,
    ) -> Self {
        ParseEntity {
            system_id,
            public_id,
            threaded,
            namespaces,
            pending,
        }
    }

    /// Entity for an external entity referenced from this one
    pub fn nested(&self, system_id: Option<String>, public_id: Option<String>) -> Self {
        ParseEntity {
            system_id,
            public_id,
            threaded: self.threaded,
            namespaces: self.namespaces.clone(),
            pending: self.pending.clone(),
        }
    }

    /// True when records go through a channel to another thread. Fixed for
    /// the life of the parse.
    #[inline]
    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    /// A parse error located in this entity
    pub fn error(&self, kind: ParseErrorKind, message: impl Into<String>, at: TextPosition) -> ParseError {
        ParseError::new(kind, message, at).with_ids(self.system_id.as_deref(), self.public_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::namespace::NamespaceRegistry;

    fn entity(threaded: bool) -> ParseEntity {
        ParseEntity::new(
            Some("doc.xml".into()),
            None,
            NamespaceContext::new(Arc::new(NamespaceRegistry::new())),
            PendingError::new(),
            threaded,
        )
    }

    #[test]
    fn test_first_error_wins() {
        let pending = PendingError::new();
        let at = TextPosition::START;
        assert!(pending.capture(ParseError::new(ParseErrorKind::Syntax, "first", at)));
        assert!(!pending.capture(ParseError::new(ParseErrorKind::Handler, "second", at)));
        assert!(pending.is_set());
        assert_eq!(pending.take().unwrap().message, "first");
        assert!(!pending.is_set());
    }

    #[test]
    fn test_nested_shares_slot_and_copies_namespaces() {
        let mut parent = entity(true);
        parent.namespaces.open_scope();
        parent.namespaces.declare("p", "urn:p");

        let mut child = parent.nested(Some("ext.xml".into()), None);
        assert!(child.is_threaded());
        assert!(child.namespaces.resolve_prefix("p").is_some());

        child.namespaces.open_scope();
        child.namespaces.declare("q", "urn:q");
        assert!(parent.namespaces.resolve_prefix("q").is_none());

        child
            .pending
            .capture(child.error(ParseErrorKind::Entity, "bad", TextPosition::START));
        let err = parent.pending.take().unwrap();
        assert_eq!(err.system_id.as_deref(), Some("ext.xml"));
    }

    #[test]
    fn test_inline_entity() {
        let e = entity(false);
        assert!(!e.is_threaded());
        assert!(!e.nested(None, None).is_threaded());
    }
}
