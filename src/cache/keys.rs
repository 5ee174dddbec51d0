//! Cache key definitions.

use std::fmt;

/// Identifies one keyword inside one source.
///
/// The source is kept as its own field so that clearing a source can never
/// match a different source whose id happens to share a string prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeywordKey {
    pub source: String,
    pub keyword: String,
}

impl KeywordKey {
    pub fn new(source: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            keyword: keyword.into(),
        }
    }

    pub fn belongs_to(&self, source: &str) -> bool {
        self.source == source
    }
}

impl fmt::Display for KeywordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.keyword)
    }
}
