//! Dispatch Engine
//!
//! Replays [`EventRecord`]s as application callbacks, on the thread that
//! invoked the parse. The engine keeps the stack of element contexts (the
//! element name and the handler created for it) and a mirror of the
//! namespace bindings for the [`Locator`].
//!
//! ```text
//! Idle -> InDocument -> InElement(depth) -> ... -> InDocument -> Finished
//!                 \_______________________________________________/
//!                                       |
//!                                     Failed
//! ```

use std::sync::Arc;

use super::attributes::AttributeList;
use super::channel::{AbandonOnDrop, EventChannel};
use super::entity::PendingError;
use super::error::{BoxError, ParseError};
use super::events::{ElementName, EventRecord};
use super::handler::{ContextHandler, DocumentHandler, Locator};
use super::namespace::NamespaceRegistry;
use super::scan::EventSink;
use crate::core::position::TextPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    InDocument,
    /// Number of open elements
    InElement(usize),
    Finished,
    Failed,
}

/// Whether replay should go on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

struct ElementContext {
    name: ElementName,
    /// None when the element is not handled
    handler: Option<Box<dyn ContextHandler>>,
}

pub struct DispatchEngine<'h> {
    document: &'h mut dyn DocumentHandler,
    contexts: Vec<ElementContext>,
    locator: Locator,
    pending: PendingError,
    system_id: Option<String>,
    public_id: Option<String>,
    state: DispatchState,
}

impl<'h> DispatchEngine<'h> {
    pub fn new(
        document: &'h mut dyn DocumentHandler,
        registry: Arc<NamespaceRegistry>,
        system_id: Option<&str>,
        public_id: Option<&str>,
        pending: PendingError,
    ) -> Self {
        DispatchEngine {
            document,
            contexts: Vec::new(),
            locator: Locator::new(registry, system_id, public_id),
            pending,
            system_id: system_id.map(str::to_string),
            public_id: public_id.map(str::to_string),
            state: DispatchState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Hand the locator to the document handler and start the document
    pub fn start(&mut self) -> Flow {
        self.document.set_document_locator(self.locator.clone());
        match self.document.start_document() {
            Ok(()) => {
                self.state = DispatchState::InDocument;
                Flow::Continue
            }
            Err(err) => {
                self.handler_failed(err, TextPosition::START);
                Flow::Stop
            }
        }
    }

    /// Replay one record
    pub fn replay(&mut self, record: EventRecord) -> Flow {
        if matches!(self.state, DispatchState::Finished | DispatchState::Failed) {
            return Flow::Stop;
        }

        let (result, at) = match record {
            EventRecord::StartElement {
                name,
                attributes,
                namespaces,
                at,
            } => {
                self.locator.set_position(at);
                self.locator.open_scope(&namespaces);
                (self.start_element(name, &attributes), at)
            }
            EventRecord::Characters { text, at } => {
                self.locator.set_position(at);
                (self.characters(&text), at)
            }
            EventRecord::EndElement { at } => {
                self.locator.set_position(at);
                let result = self.end_element();
                self.locator.close_scope();
                (result, at)
            }
            EventRecord::Done => {
                self.state = DispatchState::Finished;
                return Flow::Stop;
            }
            EventRecord::Exception => {
                self.state = DispatchState::Failed;
                return Flow::Stop;
            }
        };

        match result {
            Ok(()) => {
                self.state = match self.contexts.len() {
                    0 => DispatchState::InDocument,
                    depth => DispatchState::InElement(depth),
                };
                Flow::Continue
            }
            Err(err) => {
                self.handler_failed(err, at);
                Flow::Stop
            }
        }
    }

    /// Replay every batch the channel delivers. Once replay stops the
    /// remaining batches are drained without dispatching them, so the
    /// producer never blocks on a consumer that has lost interest.
    pub fn consume(&mut self, channel: &EventChannel) {
        let _abandon = AbandonOnDrop(channel);
        while let Some(mut batch) = channel.consume() {
            for record in batch.drain(..) {
                if self.replay(record) == Flow::Stop {
                    break;
                }
            }
            channel.recycle(batch);
        }
    }

    /// End the document if the parse succeeded
    pub fn finish(&mut self) {
        if self.state != DispatchState::Finished || self.pending.is_set() {
            return;
        }
        if let Err(err) = self.document.end_document() {
            let at = self.locator.position();
            self.handler_failed(err, at);
        }
    }

    fn start_element(&mut self, name: ElementName, attributes: &AttributeList) -> Result<(), BoxError> {
        let mut child = match self.contexts.last_mut() {
            Some(ElementContext { handler: None, .. }) => None,
            Some(ElementContext {
                handler: Some(parent),
                ..
            }) => parent.create_child(&name, attributes)?,
            None => self.document.create_child(&name, attributes)?,
        };
        if let Some(handler) = child.as_mut() {
            handler.start_element(&name, attributes)?;
        }
        self.contexts.push(ElementContext { name, handler: child });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), BoxError> {
        match self.contexts.last_mut() {
            Some(ElementContext {
                handler: Some(handler),
                ..
            }) => handler.characters(text),
            _ => Ok(()),
        }
    }

    fn end_element(&mut self) -> Result<(), BoxError> {
        let Some(mut context) = self.contexts.pop() else {
            return Ok(());
        };
        match context.handler.as_mut() {
            Some(handler) => handler.end_element(&context.name),
            None => Ok(()),
        }
    }

    fn handler_failed(&mut self, err: BoxError, at: TextPosition) {
        let err = ParseError::handler(err, at).with_ids(self.system_id.as_deref(), self.public_id.as_deref());
        self.pending.capture(err);
        self.state = DispatchState::Failed;
    }
}

impl EventSink for DispatchEngine<'_> {
    #[inline]
    fn emit(&mut self, record: EventRecord) {
        self.replay(record);
    }
}
