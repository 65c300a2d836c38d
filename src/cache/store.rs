//! In-process cache tier.
//!
//! A strict cache of the persistent tier: it can be dropped at any time and
//! only costs a round trip to refill. Expiry is time based; there is no size
//! bound.

use dashmap::DashMap;

use super::entry::CacheEntry;

#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`. An expired entry is dropped on the way out.
    pub fn get(&self, key: &str, now: i64) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if !entry.is_expired_at(now) {
            return Some(entry.clone());
        }
        drop(entry);
        self.entries
            .remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }

    pub fn insert(&self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry carrying one of `tags`; returns how many went.
    pub fn remove_tagged<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.has_any_tag(tags));
        before.saturating_sub(self.entries.len())
    }

    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
