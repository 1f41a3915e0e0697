//! Attribute Lists
//!
//! Attributes whose names resolve to a token are stored as `(token, value)`;
//! the rest keep their namespace URI and local name so handlers can still
//! see them.

use super::tokens::Token;

/// An attribute whose name has no token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAttribute {
    /// Namespace URI, empty for unprefixed names
    pub namespace: String,
    pub name: String,
    pub value: String,
}

/// The attributes of one start tag, `xmlns` declarations excluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    known: Vec<(Token, String)>,
    unknown: Vec<UnknownAttribute>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token, value: impl Into<String>) {
        self.known.push((token, value.into()));
    }

    pub fn push_unknown(&mut self, namespace: impl Into<String>, name: impl Into<String>, value: impl Into<String>) {
        self.unknown.push(UnknownAttribute {
            namespace: namespace.into(),
            name: name.into(),
            value: value.into(),
        });
    }

    /// Value of the attribute with `token`
    pub fn value(&self, token: Token) -> Option<&str> {
        self.known
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn has(&self, token: Token) -> bool {
        self.known.iter().any(|(t, _)| *t == token)
    }

    /// Tokenized attributes in document order
    pub fn iter(&self) -> impl Iterator<Item = (Token, &str)> {
        self.known.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Attributes without a token, in document order
    #[inline]
    pub fn unknown(&self) -> &[UnknownAttribute] {
        &self.unknown
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown.is_empty()
    }

    pub fn clear(&mut self) {
        self.known.clear();
        self.unknown.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown() {
        let mut attrs = AttributeList::new();
        attrs.push(7, "1");
        attrs.push_unknown("urn:x", "extra", "2");

        assert_eq!(attrs.value(7), Some("1"));
        assert!(attrs.has(7));
        assert!(!attrs.has(8));
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.unknown()[0].namespace, "urn:x");
        assert_eq!(attrs.iter().collect::<Vec<_>>(), vec![(7, "1")]);
    }

    #[test]
    fn test_clear() {
        let mut attrs = AttributeList::new();
        attrs.push(1, "a");
        attrs.clear();
        assert!(attrs.is_empty());
    }
}
