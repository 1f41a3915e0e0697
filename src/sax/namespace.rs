//! Namespace Registry and Context
//!
//! The registry maps namespace URIs to the tokens the application registered
//! for them. The context tracks which prefixes are bound while elements are
//! open: each element opens a scope, its `xmlns` attributes add bindings,
//! and closing the element truncates back to the count recorded on entry.
//! Lookups scan innermost to outermost, so redefinitions shadow.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::SaxError;
use super::tokens::{Token, NAMESPACE_TOKEN_BASE, TOKEN_UNKNOWN};

/// The namespace bound to the `xml` prefix
pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace URI → token table
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    tokens: HashMap<String, Token>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace token. Tokens below [`NAMESPACE_TOKEN_BASE`] and
    /// URIs registered before are rejected.
    pub fn register(&mut self, uri: impl Into<String>, token: Token) -> Result<(), SaxError> {
        let uri = uri.into();
        if token < NAMESPACE_TOKEN_BASE {
            return Err(SaxError::InvalidNamespaceToken { uri, token });
        }
        match self.tokens.entry(uri) {
            Entry::Occupied(entry) => Err(SaxError::NamespaceAlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(token);
                Ok(())
            }
        }
    }

    /// Token registered for `uri`, or [`TOKEN_UNKNOWN`]
    #[inline]
    pub fn token(&self, uri: &str) -> Token {
        self.tokens.get(uri).copied().unwrap_or(TOKEN_UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Token)> {
        self.tokens.iter().map(|(uri, &token)| (uri.as_str(), token))
    }
}

/// A prefix bound to a namespace. The empty prefix is the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: String,
    pub uri: String,
    pub token: Token,
}

/// Prefix bindings scoped to the open elements
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    registry: Arc<NamespaceRegistry>,
    bindings: Vec<NamespaceBinding>,
    /// Binding count when each open scope was entered
    marks: Vec<usize>,
    xml_bound: bool,
}

impl NamespaceContext {
    pub fn new(registry: Arc<NamespaceRegistry>) -> Self {
        NamespaceContext {
            registry,
            bindings: Vec::new(),
            marks: Vec::new(),
            xml_bound: false,
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.registry
    }

    /// Enter an element. The `xml` prefix is bound, outside any scope, the
    /// first time this happens.
    pub fn open_scope(&mut self) {
        if !self.xml_bound {
            let token = self.registry.token(XML_NAMESPACE_URI);
            self.define("xml", XML_NAMESPACE_URI, token);
            self.xml_bound = true;
        }
        self.marks.push(self.bindings.len());
    }

    /// Leave an element, dropping the bindings it declared. Returns false if
    /// no scope was open.
    pub fn close_scope(&mut self) -> bool {
        match self.marks.pop() {
            Some(mark) => {
                self.bindings.truncate(mark);
                true
            }
            None => false,
        }
    }

    /// Bind `prefix` in the innermost scope
    pub fn define(&mut self, prefix: &str, uri: &str, token: Token) {
        self.bindings.push(NamespaceBinding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            token,
        });
    }

    /// Bind `prefix`, looking the token up in the registry
    pub fn declare(&mut self, prefix: &str, uri: &str) -> Token {
        let token = self.namespace_token(uri);
        self.define(prefix, uri, token);
        token
    }

    /// Innermost binding of `prefix`
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&NamespaceBinding> {
        self.bindings.iter().rev().find(|b| b.prefix == prefix)
    }

    /// The default namespace in effect; `xmlns=""` undeclares it
    pub fn default_namespace(&self) -> Option<&NamespaceBinding> {
        self.resolve_prefix("").filter(|b| !b.uri.is_empty())
    }

    #[inline]
    pub fn namespace_token(&self, uri: &str) -> Token {
        self.registry.token(uri)
    }

    /// Number of open scopes
    #[inline]
    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// Bindings declared by the innermost open scope
    pub fn declared_in_scope(&self) -> &[NamespaceBinding] {
        let from = self.marks.last().copied().unwrap_or(self.bindings.len());
        &self.bindings[from..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NS_A: Token = 0x1_0000;
    const NS_B: Token = 0x2_0000;

    fn context() -> NamespaceContext {
        let mut registry = NamespaceRegistry::new();
        registry.register("urn:a", NS_A).unwrap();
        registry.register("urn:b", NS_B).unwrap();
        NamespaceContext::new(Arc::new(registry))
    }

    #[test]
    fn test_register_rejects_small_token() {
        let mut registry = NamespaceRegistry::new();
        assert!(matches!(
            registry.register("urn:a", 5),
            Err(SaxError::InvalidNamespaceToken { token: 5, .. })
        ));
    }

    #[test]
    fn test_register_rejects_duplicate_uri() {
        let mut registry = NamespaceRegistry::new();
        registry.register("urn:a", NS_A).unwrap();
        assert!(matches!(
            registry.register("urn:a", NS_B),
            Err(SaxError::NamespaceAlreadyRegistered(uri)) if uri == "urn:a"
        ));
        assert_eq!(registry.token("urn:a"), NS_A);
    }

    #[test]
    fn test_redefinition_shadows_and_restores() {
        let mut ctx = context();
        ctx.open_scope();
        ctx.declare("p", "urn:a");
        ctx.open_scope();
        ctx.declare("p", "urn:b");
        assert_eq!(ctx.resolve_prefix("p").map(|b| b.token), Some(NS_B));
        assert!(ctx.close_scope());
        assert_eq!(ctx.resolve_prefix("p").map(|b| b.token), Some(NS_A));
        assert!(ctx.close_scope());
        assert!(ctx.resolve_prefix("p").is_none());
    }

    #[test]
    fn test_xml_prefix_bound_once() {
        let mut ctx = context();
        assert!(ctx.resolve_prefix("xml").is_none());
        ctx.open_scope();
        ctx.close_scope();
        ctx.open_scope();
        let xml: Vec<_> = ctx.bindings.iter().filter(|b| b.prefix == "xml").collect();
        assert_eq!(xml.len(), 1);
        assert_eq!(xml[0].uri, XML_NAMESPACE_URI);
        assert_eq!(xml[0].token, TOKEN_UNKNOWN);
    }

    #[test]
    fn test_default_namespace_cleared() {
        let mut ctx = context();
        ctx.open_scope();
        ctx.declare("", "urn:a");
        ctx.open_scope();
        ctx.declare("", "");
        assert!(ctx.default_namespace().is_none());
        ctx.close_scope();
        assert_eq!(ctx.default_namespace().map(|b| b.token), Some(NS_A));
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut ctx = context();
        assert!(!ctx.close_scope());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_declared_in_scope() {
        let mut ctx = context();
        ctx.open_scope();
        ctx.declare("a", "urn:a");
        ctx.open_scope();
        assert!(ctx.declared_in_scope().is_empty());
        ctx.declare("b", "urn:b");
        assert_eq!(ctx.declared_in_scope().len(), 1);
        assert_eq!(ctx.declared_in_scope()[0].prefix, "b");
    }

    proptest! {
        /// After any nesting of scopes, each prefix resolves to the binding
        /// made by the innermost scope that declared it.
        #[test]
        fn prop_innermost_binding_wins(decls in proptest::collection::vec(
            proptest::option::of(0usize..3), 1..20
        )) {
            let prefixes = ["p", "q", "r"];
            let mut ctx = context();
            let mut expected: Vec<Vec<(usize, String)>> = Vec::new();

            for (depth, decl) in decls.iter().enumerate() {
                ctx.open_scope();
                let mut scope = Vec::new();
                if let Some(p) = decl {
                    let uri = format!("urn:{}", depth);
                    ctx.declare(prefixes[*p], &uri);
                    scope.push((*p, uri));
                }
                expected.push(scope);
            }

            while !expected.is_empty() {
                for (i, prefix) in prefixes.iter().enumerate() {
                    let want = expected
                        .iter()
                        .rev()
                        .flat_map(|scope| scope.iter())
                        .find(|(p, _)| *p == i)
                        .map(|(_, uri)| uri.clone());
                    let got = ctx.resolve_prefix(prefix).map(|b| b.uri.clone());
                    prop_assert_eq!(got, want);
                }
                expected.pop();
                prop_assert!(ctx.close_scope());
            }
            prop_assert_eq!(ctx.depth(), 0);
        }
    }
}
