//! Namespaced tags and their cleaning rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(namespace, subtag)` pair. An empty namespace means unnamespaced.
///
/// Both parts are stored cleaned: trimmed, lowercased, and with internal
/// whitespace runs collapsed to a single space.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub namespace: String,
    pub subtag: String,
}

impl Tag {
    /// Build a tag from already separated parts, cleaning both.
    ///
    /// Returns `None` when the subtag is blank after cleaning.
    pub fn new(namespace: &str, subtag: &str) -> Option<Self> {
        let subtag = clean_text(subtag);
        if subtag.is_empty() {
            return None;
        }
        Some(Self {
            namespace: clean_text(namespace),
            subtag,
        })
    }

    /// Parse `namespace:subtag` or `subtag` text.
    ///
    /// The namespace is everything before the first colon when that part is
    /// non-empty. A leading colon marks an unnamespaced tag whose subtag may
    /// itself contain colons. Returns `None` for blank tags.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned = clean_text(text);
        if let Some(rest) = cleaned.strip_prefix(':') {
            return Self::new("", rest);
        }
        match cleaned.split_once(':') {
            Some((namespace, subtag)) => Self::new(namespace, subtag),
            None => Self::new("", &cleaned),
        }
    }

    /// Whether the tag has a namespace.
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}:{}", self.namespace, self.subtag)
        } else if self.subtag.contains(':') {
            // keep the leading colon so the text parses back unnamespaced
            write!(f, ":{}", self.subtag)
        } else {
            write!(f, "{}", self.subtag)
        }
    }
}

/// Trim, lowercase, and collapse whitespace runs to one space.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
