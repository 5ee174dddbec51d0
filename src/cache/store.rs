//! In-process cache storage.
//!
//! Keyword entries live in an LRU guarded by an `RwLock`; display names live
//! in a `DashMap` and expire lazily when read.

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::KeywordKey;
use super::lock::{rw_read, rw_write};
use super::{
    CacheError, KeywordCache, KeywordLookup, METRIC_KEYWORD_EVICT, METRIC_KEYWORD_HIT,
    METRIC_KEYWORD_MISS, METRIC_KEYWORD_TOMBSTONE, METRIC_NAME_HIT, METRIC_NAME_MISS, NameCache,
};

#[derive(Debug, Clone)]
enum CachedKeyword {
    Present(String),
    Tombstone,
}

// ============================================================================
// Keyword cache
// ============================================================================

/// LRU-bounded keyword cache shared by all sources.
///
/// Eviction only ever turns an entry back into [`KeywordLookup::Unknown`].
pub struct MemoryKeywordCache {
    entries: RwLock<LruCache<KeywordKey, CachedKeyword>>,
}

impl MemoryKeywordCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.keyword_limit_non_zero())),
        }
    }

    fn put(&self, key: KeywordKey, value: CachedKeyword, op: &'static str) {
        let evicted = rw_write(&self.entries, op).push(key.clone(), value);
        // push returns the old value for a replaced key as well; only a
        // different key means capacity eviction
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_KEYWORD_EVICT).increment(1);
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "keyword_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeywordCache for MemoryKeywordCache {
    async fn lookup(&self, source: &str, keyword: &str) -> Result<KeywordLookup, CacheError> {
        let key = KeywordKey::new(source, keyword);
        let cached = rw_write(&self.entries, "keyword_lookup").get(&key).cloned();

        let lookup = match cached {
            Some(CachedKeyword::Present(description)) => {
                counter!(METRIC_KEYWORD_HIT).increment(1);
                KeywordLookup::Hit(description)
            }
            Some(CachedKeyword::Tombstone) => {
                counter!(METRIC_KEYWORD_TOMBSTONE).increment(1);
                KeywordLookup::Tombstoned
            }
            None => {
                counter!(METRIC_KEYWORD_MISS).increment(1);
                KeywordLookup::Unknown
            }
        };
        Ok(lookup)
    }

    async fn store(
        &self,
        source: &str,
        keyword: &str,
        description: &str,
    ) -> Result<(), CacheError> {
        self.put(
            KeywordKey::new(source, keyword),
            CachedKeyword::Present(description.to_string()),
            "keyword_store",
        );
        Ok(())
    }

    async fn tombstone(&self, source: &str, keyword: &str) -> Result<(), CacheError> {
        self.put(
            KeywordKey::new(source, keyword),
            CachedKeyword::Tombstone,
            "keyword_tombstone",
        );
        Ok(())
    }

    async fn clear_all(&self, source: &str) -> Result<usize, CacheError> {
        let mut entries = rw_write(&self.entries, "keyword_clear_all");
        let doomed: Vec<KeywordKey> = entries
            .iter()
            .filter(|(key, _)| key.belongs_to(source))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        debug!(source, removed = doomed.len(), "Cleared keyword cache namespace");
        Ok(doomed.len())
    }
}

// ============================================================================
// Display-name cache
// ============================================================================

#[derive(Debug, Clone)]
struct NameEntry {
    name: String,
    expires_at: Instant,
}

/// TTL cache for user display names. Expired entries are dropped on read.
pub struct MemoryNameCache {
    names: DashMap<String, NameEntry>,
    soft_limit: usize,
}

impl MemoryNameCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            names: DashMap::new(),
            soft_limit: config.display_name_limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[async_trait]
impl NameCache for MemoryNameCache {
    async fn get_name(&self, user_id: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let live = self
            .names
            .get(user_id)
            .map(|entry| (entry.expires_at > now).then(|| entry.name.clone()));

        match live {
            Some(Some(name)) => {
                counter!(METRIC_NAME_HIT).increment(1);
                Ok(Some(name))
            }
            Some(None) => {
                // the read guard is released above; removing here cannot deadlock
                self.names
                    .remove_if(user_id, |_, entry| entry.expires_at <= now);
                counter!(METRIC_NAME_MISS).increment(1);
                Ok(None)
            }
            None => {
                counter!(METRIC_NAME_MISS).increment(1);
                Ok(None)
            }
        }
    }

    async fn set_name(&self, user_id: &str, name: &str, ttl: Duration) -> Result<(), CacheError> {
        if self.names.len() >= self.soft_limit && !self.names.contains_key(user_id) {
            let now = Instant::now();
            self.names.retain(|_, entry| entry.expires_at > now);
            if self.names.len() >= self.soft_limit {
                debug!(user_id, "Display-name cache full; skipping insert");
                return Ok(());
            }
        }

        self.names.insert(
            user_id.to_string(),
            NameEntry {
                name: name.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

// ============================================================================
// Disabled cache
// ============================================================================

/// Cache used when caching is switched off: every read misses and every
/// write is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl KeywordCache for DisabledCache {
    async fn lookup(&self, _source: &str, _keyword: &str) -> Result<KeywordLookup, CacheError> {
        Ok(KeywordLookup::Unknown)
    }

    async fn store(
        &self,
        _source: &str,
        _keyword: &str,
        _description: &str,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn tombstone(&self, _source: &str, _keyword: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear_all(&self, _source: &str) -> Result<usize, CacheError> {
        Ok(0)
    }
}

#[async_trait]
impl NameCache for DisabledCache {
    async fn get_name(&self, _user_id: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set_name(
        &self,
        _user_id: &str,
        _name: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn keyword_cache() -> MemoryKeywordCache {
        MemoryKeywordCache::new(&CacheConfig::default())
    }

    #[tokio::test]
    async fn cold_lookup_is_unknown() {
        let cache = keyword_cache();
        assert_eq!(
            cache.lookup("group-1", "socks").await.unwrap(),
            KeywordLookup::Unknown
        );
    }

    #[tokio::test]
    async fn store_then_lookup_hits() {
        let cache = keyword_cache();
        cache.store("group-1", "socks", "wool").await.unwrap();
        assert_eq!(
            cache.lookup("group-1", "socks").await.unwrap(),
            KeywordLookup::Hit("wool".to_string())
        );
    }

    #[tokio::test]
    async fn tombstone_then_lookup_is_tombstoned() {
        let cache = keyword_cache();
        cache.store("group-1", "socks", "wool").await.unwrap();
        cache.tombstone("group-1", "socks").await.unwrap();
        assert_eq!(
            cache.lookup("group-1", "socks").await.unwrap(),
            KeywordLookup::Tombstoned
        );
    }

    #[tokio::test]
    async fn store_and_tombstone_are_last_write_wins() {
        let cache = keyword_cache();
        cache.tombstone("g", "k").await.unwrap();
        cache.tombstone("g", "k").await.unwrap();
        cache.store("g", "k", "first").await.unwrap();
        cache.store("g", "k", "second").await.unwrap();

        assert_eq!(
            cache.lookup("g", "k").await.unwrap(),
            KeywordLookup::Hit("second".to_string())
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn description_matching_a_marker_is_still_a_hit() {
        let cache = keyword_cache();
        cache.store("g", "k", "NOT_EXIST").await.unwrap();
        assert_eq!(
            cache.lookup("g", "k").await.unwrap(),
            KeywordLookup::Hit("NOT_EXIST".to_string())
        );
    }

    #[tokio::test]
    async fn clear_all_only_touches_the_given_source() {
        let cache = keyword_cache();
        cache.store("group-1", "a", "x").await.unwrap();
        cache.tombstone("group-1", "b").await.unwrap();
        cache.store("group-10", "a", "y").await.unwrap();
        cache.store("room-2", "a", "z").await.unwrap();

        let removed = cache.clear_all("group-1").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            cache.lookup("group-1", "a").await.unwrap(),
            KeywordLookup::Unknown
        );
        assert_eq!(
            cache.lookup("group-1", "b").await.unwrap(),
            KeywordLookup::Unknown
        );
        assert_eq!(
            cache.lookup("group-10", "a").await.unwrap(),
            KeywordLookup::Hit("y".to_string())
        );
        assert_eq!(
            cache.lookup("room-2", "a").await.unwrap(),
            KeywordLookup::Hit("z".to_string())
        );
    }

    #[tokio::test]
    async fn eviction_falls_back_to_unknown() {
        let config = CacheConfig {
            keyword_limit: 2,
            ..Default::default()
        };
        let cache = MemoryKeywordCache::new(&config);

        cache.store("g", "one", "1").await.unwrap();
        cache.store("g", "two", "2").await.unwrap();
        cache.tombstone("g", "three").await.unwrap();

        assert_eq!(cache.lookup("g", "one").await.unwrap(), KeywordLookup::Unknown);
        assert_eq!(
            cache.lookup("g", "two").await.unwrap(),
            KeywordLookup::Hit("2".to_string())
        );
        assert_eq!(
            cache.lookup("g", "three").await.unwrap(),
            KeywordLookup::Tombstoned
        );
    }

    #[tokio::test]
    async fn keyword_cache_recovers_from_poisoned_lock() {
        let cache = keyword_cache();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.store("g", "k", "v").await.unwrap();
        assert_eq!(
            cache.lookup("g", "k").await.unwrap(),
            KeywordLookup::Hit("v".to_string())
        );
    }

    #[tokio::test]
    async fn names_round_trip_within_ttl() {
        let cache = MemoryNameCache::new(&CacheConfig::default());
        assert_eq!(cache.get_name("U1").await.unwrap(), None);

        cache
            .set_name("U1", "Niki", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_name("U1").await.unwrap().as_deref(), Some("Niki"));
    }

    #[tokio::test]
    async fn expired_names_are_dropped_on_read() {
        let cache = MemoryNameCache::new(&CacheConfig::default());
        cache.set_name("U1", "Niki", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get_name("U1").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn full_name_cache_makes_room_from_expired_entries() {
        let config = CacheConfig {
            display_name_limit: 1,
            ..Default::default()
        };
        let cache = MemoryNameCache::new(&config);

        cache.set_name("U1", "old", Duration::ZERO).await.unwrap();
        cache
            .set_name("U2", "fresh", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set_name("U3", "skipped", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_name("U2").await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(cache.get_name("U3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn name_cache_is_independent_of_keyword_clear() {
        let keywords = keyword_cache();
        let names = MemoryNameCache::new(&CacheConfig::default());
        names
            .set_name("group-1", "Niki", Duration::from_secs(60))
            .await
            .unwrap();

        keywords.clear_all("group-1").await.unwrap();

        assert_eq!(
            names.get_name("group-1").await.unwrap().as_deref(),
            Some("Niki")
        );
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = DisabledCache;
        cache.store("g", "k", "v").await.unwrap();
        assert_eq!(cache.lookup("g", "k").await.unwrap(), KeywordLookup::Unknown);
        cache
            .set_name("U1", "n", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_name("U1").await.unwrap(), None);
    }
}
