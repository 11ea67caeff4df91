//! Autocomplete search input and results.

use crate::tag::{Tag, clean_text};
use serde::{Deserialize, Serialize};

/// Escape character used in generated `LIKE` patterns.
pub const LIKE_ESCAPE: char = '\\';

/// A parsed partial-text search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutocompleteQuery {
    /// Exact namespace filter; `None` searches every namespace.
    pub namespace: Option<String>,
    /// SQL `LIKE` pattern for the subtag, escaped with [`LIKE_ESCAPE`].
    pub subtag_pattern: String,
}

impl AutocompleteQuery {
    /// Parse partial text typed by a user.
    ///
    /// `series:fo` filters the `series` namespace for subtags starting with
    /// `fo`; `fo` searches subtags in all namespaces; `*` is a wildcard.
    /// Returns `None` for blank input.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return None;
        }

        let (namespace, subtag) = if let Some(rest) = cleaned.strip_prefix(':') {
            (Some(String::new()), rest.to_string())
        } else {
            match cleaned.split_once(':') {
                Some((namespace, subtag)) => (Some(namespace.to_string()), subtag.to_string()),
                None => (None, cleaned.clone()),
            }
        };

        Some(Self {
            namespace,
            subtag_pattern: like_prefix_pattern(&subtag),
        })
    }
}

/// One autocomplete result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteMatch {
    pub tag: Tag,
    pub count: u64,
}

/// Build a prefix `LIKE` pattern, treating `*` as a wildcard.
fn like_prefix_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 1);
    for c in text.chars() {
        match c {
            '*' => pattern.push('%'),
            '%' | '_' | LIKE_ESCAPE => {
                pattern.push(LIKE_ESCAPE);
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
    }
    if !pattern.ends_with('%') || pattern.ends_with("\\%") {
        pattern.push('%');
    }
    pattern
}
