//! Recording Handler
//!
//! A document handler that handles every element and records each callback
//! it receives. The NIF returns the recording to Elixir; tests compare it
//! against the expected callback sequence.

use std::cell::RefCell;
use std::rc::Rc;

use super::attributes::{AttributeList, UnknownAttribute};
use super::error::BoxError;
use super::events::ElementName;
use super::handler::{ContextHandler, DocumentHandler};
use super::tokens::Token;

/// One recorded callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    StartDocument,
    Start {
        element: ElementName,
        attributes: Vec<(Token, String)>,
        unknown: Vec<UnknownAttribute>,
    },
    Characters(String),
    End(ElementName),
    EndDocument,
}

impl Callback {
    /// Start of a tokenized element with tokenized attributes
    pub fn start(token: Token, attributes: &[(Token, &str)]) -> Self {
        Callback::Start {
            element: ElementName::Token(token),
            attributes: attributes.iter().map(|&(t, v)| (t, v.to_string())).collect(),
            unknown: Vec::new(),
        }
    }

    fn from_start(name: &ElementName, attributes: &AttributeList) -> Self {
        Callback::Start {
            element: name.clone(),
            attributes: attributes.iter().map(|(t, v)| (t, v.to_string())).collect(),
            unknown: attributes.unknown().to_vec(),
        }
    }
}

type Log = Rc<RefCell<Vec<Callback>>>;

/// Records callbacks; clones share the recording
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    log: Log,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> Vec<Callback> {
        self.log.borrow().clone()
    }

    pub fn take(&self) -> Vec<Callback> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    fn context(&self) -> Box<dyn ContextHandler> {
        Box::new(RecordingContext {
            log: Rc::clone(&self.log),
        })
    }
}

impl DocumentHandler for RecordingHandler {
    fn start_document(&mut self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Callback::StartDocument);
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Callback::EndDocument);
        Ok(())
    }

    fn create_child(
        &mut self,
        _name: &ElementName,
        _attributes: &AttributeList,
    ) -> Result<Option<Box<dyn ContextHandler>>, BoxError> {
        Ok(Some(self.context()))
    }
}

struct RecordingContext {
    log: Log,
}

impl ContextHandler for RecordingContext {
    fn create_child(
        &mut self,
        _name: &ElementName,
        _attributes: &AttributeList,
    ) -> Result<Option<Box<dyn ContextHandler>>, BoxError> {
        Ok(Some(Box::new(RecordingContext {
            log: Rc::clone(&self.log),
        })))
    }

    fn start_element(&mut self, name: &ElementName, attributes: &AttributeList) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Callback::from_start(name, attributes));
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Callback::Characters(text.to_string()));
        Ok(())
    }

    fn end_element(&mut self, name: &ElementName) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Callback::End(name.clone()));
        Ok(())
    }
}
