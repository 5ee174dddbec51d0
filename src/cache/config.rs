//! Cache configuration.
//!
//! Controls the keyword cache and the display-name cache via `tallybot.toml`.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_KEYWORD_LIMIT: usize = 10_000;
const DEFAULT_DISPLAY_NAME_LIMIT: usize = 2_000;
const DEFAULT_DISPLAY_NAME_TTL_SECS: u64 = 10 * 24 * 60 * 60;

/// Cache configuration from `tallybot.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-process caches. When off every lookup is a miss.
    pub enabled: bool,
    /// Maximum (source, keyword) entries, tombstones included.
    pub keyword_limit: usize,
    /// Soft ceiling on cached display names.
    pub display_name_limit: usize,
    /// How long a resolved display name stays valid.
    pub display_name_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            display_name_limit: DEFAULT_DISPLAY_NAME_LIMIT,
            display_name_ttl_secs: DEFAULT_DISPLAY_NAME_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            keyword_limit: settings.keyword_limit.get(),
            display_name_limit: settings.display_name_limit.get(),
            display_name_ttl_secs: settings.display_name_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the keyword limit as NonZeroUsize, clamping to 1 if zero.
    pub fn keyword_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.keyword_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn display_name_ttl(&self) -> Duration {
        Duration::from_secs(self.display_name_ttl_secs)
    }
}
