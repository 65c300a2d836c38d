//! Two-tier read-through cache.
//!
//! - **Memory tier**: per-process map, dropped on restart.
//! - **Persistent tier**: the shared `cache` collection in the document
//!   store, visible to every process.
//!
//! Entries expire by time only and are grouped by tags for bulk
//! invalidation. Construct one [`CacheService`] per process and share it by
//! `Arc`.
//!
//! ```toml
//! [cache]
//! enable_memory_tier = true
//! collection = "cache"
//! default_ttl_seconds = 300
//! entity_ttl_seconds = 900
//! list_ttl_seconds = 600
//! search_ttl_seconds = 300
//! ```

mod clock;
mod config;
mod entry;
mod keys;
mod service;
mod store;

pub use clock::{Clock, ManualClock, SystemClock, unix_millis};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use keys::{CacheKeys, CacheTags};
pub use service::{CacheError, CacheLookup, CacheService, CleanupReport, InvalidationReport, Tier};
pub use store::MemoryTier;
