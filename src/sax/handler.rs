//! Application Handler Traits
//!
//! Handlers are only ever called on the thread that invoked the parse, so
//! none of them need to be `Send`. Element handling is contextual: the
//! handler of the enclosing element creates the handler of each child, and
//! returning `None` leaves the child and its whole subtree unhandled.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::attributes::AttributeList;
use super::error::{BoxError, ParseError, SaxError};
use super::events::ElementName;
use super::namespace::{NamespaceBinding, NamespaceContext, NamespaceRegistry};
use crate::core::position::TextPosition;
use crate::reader::InputSource;

/// Handles one element and creates the handlers of its children
pub trait ContextHandler {
    fn create_child(
        &mut self,
        _name: &ElementName,
        _attributes: &AttributeList,
    ) -> Result<Option<Box<dyn ContextHandler>>, BoxError> {
        Ok(None)
    }

    /// Called on the handler returned by `create_child`
    fn start_element(&mut self, _name: &ElementName, _attributes: &AttributeList) -> Result<(), BoxError> {
        Ok(())
    }

    fn characters(&mut self, _text: &str) -> Result<(), BoxError> {
        Ok(())
    }

    fn end_element(&mut self, _name: &ElementName) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Receives document-level callbacks and creates the root element's handler
pub trait DocumentHandler {
    /// Called before anything else, with a locator that tracks the
    /// callback being dispatched
    fn set_document_locator(&mut self, _locator: Locator) {}

    fn start_document(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called only when the parse succeeded
    fn end_document(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn create_child(
        &mut self,
        _name: &ElementName,
        _attributes: &AttributeList,
    ) -> Result<Option<Box<dyn ContextHandler>>, BoxError> {
        Ok(None)
    }
}

/// Offered the parse error before it is returned
pub trait ErrorHandler {
    /// Returning an error replaces the parse error with it
    fn fatal_error(&mut self, error: &ParseError) -> Result<(), BoxError>;
}

/// Supplies the content of external parsed entities
pub trait EntityResolver: Send + Sync {
    /// `Ok(None)` skips the entity
    fn resolve_entity(&self, public_id: Option<&str>, system_id: &str) -> Result<Option<InputSource>, BoxError>;
}

/// A document handler that ignores everything
#[derive(Debug, Default)]
pub struct DiscardHandler;

impl DocumentHandler for DiscardHandler {}

#[derive(Debug)]
struct LocatorState {
    position: TextPosition,
    system_id: Option<String>,
    public_id: Option<String>,
    namespaces: NamespaceContext,
}

/// Where the dispatcher is in the document
///
/// Clones share state, so a locator kept by a handler follows the parse.
/// Namespace lookups see the bindings in scope at the callback being
/// dispatched, not where the scanner has got to.
#[derive(Debug, Clone)]
pub struct Locator {
    inner: Rc<RefCell<LocatorState>>,
}

impl Locator {
    pub(crate) fn new(registry: Arc<NamespaceRegistry>, system_id: Option<&str>, public_id: Option<&str>) -> Self {
        Locator {
            inner: Rc::new(RefCell::new(LocatorState {
                position: TextPosition::START,
                system_id: system_id.map(str::to_string),
                public_id: public_id.map(str::to_string),
                namespaces: NamespaceContext::new(registry),
            })),
        }
    }

    pub fn line(&self) -> u32 {
        self.inner.borrow().position.line
    }

    pub fn column(&self) -> u32 {
        self.inner.borrow().position.column
    }

    pub fn position(&self) -> TextPosition {
        self.inner.borrow().position
    }

    pub fn system_id(&self) -> Option<String> {
        self.inner.borrow().system_id.clone()
    }

    pub fn public_id(&self) -> Option<String> {
        self.inner.borrow().public_id.clone()
    }

    /// URI bound to `prefix`; the empty prefix asks for the default namespace
    pub fn resolve_namespace_uri(&self, prefix: &str) -> Result<String, SaxError> {
        let state = self.inner.borrow();
        let binding = if prefix.is_empty() {
            state.namespaces.default_namespace()
        } else {
            state.namespaces.resolve_prefix(prefix)
        };
        binding
            .map(|b| b.uri.clone())
            .ok_or_else(|| SaxError::UnboundPrefix(prefix.to_string()))
    }

    pub fn has_namespace_uri(&self, prefix: &str) -> bool {
        self.resolve_namespace_uri(prefix).is_ok()
    }

    pub(crate) fn set_position(&self, position: TextPosition) {
        self.inner.borrow_mut().position = position;
    }

    pub(crate) fn open_scope(&self, bindings: &[NamespaceBinding]) {
        let mut state = self.inner.borrow_mut();
        state.namespaces.open_scope();
        for b in bindings {
            state.namespaces.define(&b.prefix, &b.uri, b.token);
        }
    }

    pub(crate) fn close_scope(&self) {
        self.inner.borrow_mut().namespaces.close_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::namespace::XML_NAMESPACE_URI;

    fn binding(prefix: &str, uri: &str) -> NamespaceBinding {
        NamespaceBinding {
            prefix: prefix.into(),
            uri: uri.into(),
            token: -1,
        }
    }

    #[test]
    fn test_locator_tracks_scopes() {
        let locator = Locator::new(Arc::new(NamespaceRegistry::new()), Some("doc.xml"), None);
        assert!(!locator.has_namespace_uri("p"));

        locator.open_scope(&[binding("p", "urn:p")]);
        let seen_by_handler = locator.clone();
        assert_eq!(seen_by_handler.resolve_namespace_uri("p").unwrap(), "urn:p");
        assert_eq!(seen_by_handler.resolve_namespace_uri("xml").unwrap(), XML_NAMESPACE_URI);

        locator.close_scope();
        assert!(matches!(
            seen_by_handler.resolve_namespace_uri("p"),
            Err(SaxError::UnboundPrefix(p)) if p == "p"
        ));
        assert_eq!(seen_by_handler.system_id().as_deref(), Some("doc.xml"));
    }

    #[test]
    fn test_locator_position() {
        let locator = Locator::new(Arc::new(NamespaceRegistry::new()), None, None);
        locator.set_position(TextPosition::new(3, 9));
        assert_eq!((locator.line(), locator.column()), (3, 9));
    }
}
