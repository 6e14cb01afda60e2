//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_INDEX_TTL_SECONDS: u64 = 20;
const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve the home page from the cache.
    pub enabled: bool,
    /// Lifetime of a cached page in seconds.
    pub index_ttl_seconds: u64,
    /// Maximum stored pages; the least recently used page is evicted first.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_ttl_seconds: DEFAULT_INDEX_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            index_ttl_seconds: settings.index_ttl_seconds,
            max_entries: settings.max_entries,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_seconds)
    }

    /// A zero TTL stores nothing, so the cache behaves as disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.index_ttl_seconds > 0
    }

    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
