//! Cache configuration.
//!
//! TTLs are resolved per call: an explicit TTL wins, otherwise
//! `default_ttl` applies. The entity/list/search TTLs are the values the
//! data services pass for their read paths.

use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 5 * 60;
const DEFAULT_ENTITY_TTL_SECS: u64 = 15 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 10 * 60;
const DEFAULT_SEARCH_TTL_SECS: u64 = 5 * 60;
const DEFAULT_COLLECTION: &str = "cache";

/// Cache configuration, resolved from the `[cache]` settings section.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Keep a process-local copy of entries in front of the persistent tier.
    pub enable_memory_tier: bool,
    /// Document collection holding persisted entries.
    pub collection: String,
    /// TTL applied when a caller does not pass one.
    pub default_ttl: Duration,
    /// TTL for single-entity reads (one post, one user).
    pub entity_ttl: Duration,
    /// TTL for list reads (all posts, posts by author, comments on a post).
    pub list_ttl: Duration,
    /// TTL for search results.
    pub search_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_tier: true,
            collection: DEFAULT_COLLECTION.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            entity_ttl: Duration::from_secs(DEFAULT_ENTITY_TTL_SECS),
            list_ttl: Duration::from_secs(DEFAULT_LIST_TTL_SECS),
            search_ttl: Duration::from_secs(DEFAULT_SEARCH_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_memory_tier: settings.enable_memory_tier,
            collection: settings.collection.clone(),
            default_ttl: settings.default_ttl,
            entity_ttl: settings.entity_ttl,
            list_ttl: settings.list_ttl,
            search_ttl: settings.search_ttl,
        }
    }
}

impl CacheConfig {
    /// An explicit zero TTL falls back to the default.
    pub fn resolve_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        }
    }
}
