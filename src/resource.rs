//! ResourceArc Wrappers
//!
//! A configured parser kept on the Elixir side for repeated use. Handlers
//! are not `Send`, so the resource holds what a parser is built from and
//! builds a fresh [`FastParser`] per parse.

use std::sync::Arc;

use rustler::ResourceArc;

use crate::sax::{FastParser, NamespaceRegistry, ParserConfig, SaxError, Token, TokenResolver, TokenTable};

pub struct ParserResource {
    tokens: Arc<TokenTable>,
    namespaces: NamespaceRegistry,
    config: ParserConfig,
}

impl ParserResource {
    /// # Errors
    ///
    /// Fails on the first invalid or duplicate namespace registration.
    pub fn new(tokens: TokenTable, namespaces: Vec<(String, Token)>) -> Result<Self, SaxError> {
        let mut registry = NamespaceRegistry::new();
        for (uri, token) in namespaces {
            registry.register(uri, token)?;
        }
        Ok(ParserResource {
            tokens: Arc::new(tokens),
            namespaces: registry,
            config: ParserConfig::default(),
        })
    }

    /// A parser configured from this resource
    pub fn parser(&self) -> FastParser {
        let mut parser = FastParser::with_config(self.config.clone());
        parser.set_shared_token_resolver(Arc::clone(&self.tokens) as Arc<dyn TokenResolver>);
        parser.set_namespace_registry(self.namespaces.clone());
        parser
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[rustler::resource_impl]
impl rustler::Resource for ParserResource {}

/// Type alias for the ResourceArc
pub type ParserRef = ResourceArc<ParserResource>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::InputSource;
    use crate::sax::{Callback, RecordingHandler};

    #[test]
    fn test_parser_from_resource() {
        let tokens: TokenTable = [("a", 1)].into_iter().collect();
        let resource = ParserResource::new(tokens, vec![("urn:a".to_string(), 0x1_0000)]).unwrap();
        assert_eq!(resource.token_count(), 1);

        let mut handler = RecordingHandler::new();
        resource
            .parser()
            .parse_with_handler(InputSource::from_bytes(r#"<a xmlns="urn:a"/>"#), &mut handler)
            .unwrap();
        assert_eq!(handler.callbacks()[1], Callback::start(0x1_0001, &[]));
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let result = ParserResource::new(TokenTable::new(), vec![("urn:a".to_string(), 3)]);
        assert!(matches!(result, Err(SaxError::InvalidNamespaceToken { .. })));
    }
}
