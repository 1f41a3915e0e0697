//! Token Resolution
//!
//! Element and attribute names reach handlers as integer tokens looked up in
//! an externally supplied interning table. A name qualified by a registered
//! namespace is reported as `namespace_token | name_token`; namespace tokens
//! start at [`NAMESPACE_TOKEN_BASE`] so the two halves never overlap.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// An interned name
pub type Token = i32;

/// Returned when a name has no mapping
pub const TOKEN_UNKNOWN: Token = -1;

/// Smallest valid namespace token
pub const NAMESPACE_TOKEN_BASE: Token = 0x1_0000;

/// Maps UTF-8 names to tokens
///
/// The resolver is called from the scanning thread, which is not the thread
/// that invoked the parse when threading is on.
pub trait TokenResolver: Send + Sync {
    /// Token for `name`, or [`TOKEN_UNKNOWN`]
    fn resolve(&self, name: &[u8]) -> Token;
}

impl<F> TokenResolver for F
where
    F: Fn(&[u8]) -> Token + Send + Sync,
{
    #[inline]
    fn resolve(&self, name: &[u8]) -> Token {
        self(name)
    }
}

/// A fixed name → token table
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<Vec<u8>, Token>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping, returning the previous token for the name
    pub fn insert(&mut self, name: impl Into<Vec<u8>>, token: Token) -> Option<Token> {
        self.tokens.insert(name.into(), token)
    }

    #[inline]
    pub fn get(&self, name: &[u8]) -> Option<Token> {
        self.tokens.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenResolver for TokenTable {
    #[inline]
    fn resolve(&self, name: &[u8]) -> Token {
        self.get(name).unwrap_or(TOKEN_UNKNOWN)
    }
}

impl<N: Into<Vec<u8>>> FromIterator<(N, Token)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (N, Token)>>(iter: I) -> Self {
        TokenTable {
            tokens: iter.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }
}

/// Combine a namespace token and a name token
#[inline]
pub fn combine(namespace: Token, name: Token) -> Token {
    if namespace == TOKEN_UNKNOWN || name == TOKEN_UNKNOWN {
        TOKEN_UNKNOWN
    } else {
        namespace | name
    }
}

/// Bounded memo in front of a resolver
///
/// Documents repeat a small vocabulary of names, so most lookups hit.
pub struct TokenCache<'r> {
    resolver: &'r dyn TokenResolver,
    cache: Option<LruCache<Vec<u8>, Token>>,
    hits: u64,
    misses: u64,
}

impl<'r> TokenCache<'r> {
    /// A capacity of 0 disables caching
    pub fn new(resolver: &'r dyn TokenResolver, capacity: usize) -> Self {
        TokenCache {
            resolver,
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    pub fn resolve(&mut self, name: &[u8]) -> Token {
        let Some(cache) = self.cache.as_mut() else {
            return self.resolver.resolve(name);
        };
        if let Some(&token) = cache.get(name) {
            self.hits += 1;
            return token;
        }
        self.misses += 1;
        let token = self.resolver.resolve(name);
        cache.put(name.to_vec(), token);
        token
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_table_resolves() {
        let table: TokenTable = [("a", 5), ("b", 6)].into_iter().collect();
        assert_eq!(table.resolve(b"a"), 5);
        assert_eq!(table.resolve(b"zzz"), TOKEN_UNKNOWN);
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine(NAMESPACE_TOKEN_BASE, 7), 0x1_0007);
        assert_eq!(combine(TOKEN_UNKNOWN, 7), TOKEN_UNKNOWN);
        assert_eq!(combine(NAMESPACE_TOKEN_BASE, TOKEN_UNKNOWN), TOKEN_UNKNOWN);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |name: &[u8]| if name == b"x" { 1 } else { TOKEN_UNKNOWN };
        assert_eq!(resolver.resolve(b"x"), 1);
    }

    #[test]
    fn test_cache_memoizes() {
        let calls = AtomicUsize::new(0);
        let resolver = |name: &[u8]| {
            calls.fetch_add(1, Ordering::Relaxed);
            name.len() as Token
        };
        let mut cache = TokenCache::new(&resolver, 2);
        assert_eq!(cache.resolve(b"abc"), 3);
        assert_eq!(cache.resolve(b"abc"), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_cache_disabled() {
        let calls = AtomicUsize::new(0);
        let resolver = |_: &[u8]| {
            calls.fetch_add(1, Ordering::Relaxed);
            TOKEN_UNKNOWN
        };
        let mut cache = TokenCache::new(&resolver, 0);
        cache.resolve(b"a");
        cache.resolve(b"a");
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
