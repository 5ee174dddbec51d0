//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{KeywordEntry, UsageEvent};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateEntryParams {
    pub source: String,
    pub keyword: String,
    pub description: String,
    pub creator: String,
}

/// Keyword definitions per source. The source of truth for what exists.
#[async_trait]
pub trait DictionaryRepo: Send + Sync {
    /// Insert a new entry. Fails with [`RepoError::Duplicate`] when the
    /// keyword is already registered for the source.
    async fn create_entry(&self, params: CreateEntryParams) -> Result<KeywordEntry, RepoError>;

    /// Delete one entry. Fails with [`RepoError::NotFound`] when nothing was deleted.
    async fn remove_entry(&self, source: &str, keyword: &str) -> Result<(), RepoError>;

    async fn get_entry_by_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Option<KeywordEntry>, RepoError>;

    /// Entries of a source in creation order.
    async fn list_entries(&self, source: &str) -> Result<Vec<KeywordEntry>, RepoError>;

    /// Returns the number of deleted entries.
    async fn delete_entries_by_source(&self, source: &str) -> Result<u64, RepoError>;
}

/// Append-only keyword increment log.
#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn append_usage_event(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<UsageEvent, RepoError>;

    async fn delete_usage_by_keyword(&self, source: &str, keyword: &str)
    -> Result<u64, RepoError>;

    async fn delete_usage_by_source(&self, source: &str) -> Result<u64, RepoError>;

    /// Events of a source recorded at or after `since`, oldest first.
    async fn list_usage_since(
        &self,
        source: &str,
        since: OffsetDateTime,
    ) -> Result<Vec<UsageEvent>, RepoError>;
}
