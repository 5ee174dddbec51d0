//! Tallybot cache system
//!
//! Two independent caches sit in front of the repositories:
//!
//! - **Keyword cache**: `(source, keyword)` → description, or an explicit
//!   tombstone meaning the keyword is known not to exist.
//! - **Display-name cache**: user id → display name, with a TTL.
//!
//! The caches never consult a repository. Callers populate them after a miss
//! and must treat every [`CacheError`] as a miss or a skipped write.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! keyword_limit = 10000
//! display_name_ttl_secs = 864000
//! ```

mod config;
mod keys;
mod lock;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::CacheConfig;
pub use keys::KeywordKey;
pub use store::{DisabledCache, MemoryKeywordCache, MemoryNameCache};

pub const METRIC_KEYWORD_HIT: &str = "tallybot_cache_keyword_hit_total";
pub const METRIC_KEYWORD_MISS: &str = "tallybot_cache_keyword_miss_total";
pub const METRIC_KEYWORD_TOMBSTONE: &str = "tallybot_cache_keyword_tombstone_total";
pub const METRIC_KEYWORD_EVICT: &str = "tallybot_cache_keyword_evict_total";
pub const METRIC_NAME_HIT: &str = "tallybot_cache_name_hit_total";
pub const METRIC_NAME_MISS: &str = "tallybot_cache_name_miss_total";
pub const METRIC_CACHE_ERROR: &str = "tallybot_cache_error_total";

/// Result of a keyword cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordLookup {
    /// The keyword exists with this description.
    Hit(String),
    /// The keyword is known not to exist.
    Tombstoned,
    /// Nothing is cached; the repository must be consulted.
    Unknown,
}

/// Cache failures are infrastructure failures only, never semantic ones.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeywordCache: Send + Sync {
    async fn lookup(&self, source: &str, keyword: &str) -> Result<KeywordLookup, CacheError>;

    async fn store(&self, source: &str, keyword: &str, description: &str)
    -> Result<(), CacheError>;

    async fn tombstone(&self, source: &str, keyword: &str) -> Result<(), CacheError>;

    /// Drop every entry of `source`, tombstones included. Returns how many
    /// entries were removed.
    async fn clear_all(&self, source: &str) -> Result<usize, CacheError>;
}

#[async_trait]
pub trait NameCache: Send + Sync {
    async fn get_name(&self, user_id: &str) -> Result<Option<String>, CacheError>;

    async fn set_name(&self, user_id: &str, name: &str, ttl: Duration) -> Result<(), CacheError>;
}
