//! Two-tier read-through cache over a [`DocumentStore`].
//!
//! Reads consult the in-process [`MemoryTier`] first and fall back to the
//! shared `cache` collection, promoting live entries on the way. Writes go to
//! both tiers. Every operation comes in two flavours: `try_*` returns the
//! failure, the plain one logs it and carries on as if the cache were empty.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::repos::{DocumentStore, StoreError};

use super::clock::Clock;
use super::config::CacheConfig;
use super::entry::CacheEntry;
use super::store::MemoryTier;

const METRIC_HIT: &str = "penwell_cache_hit_total";
const METRIC_MISS: &str = "penwell_cache_miss_total";
const METRIC_DEGRADED: &str = "penwell_cache_degraded_total";
const METRIC_INVALIDATED: &str = "penwell_cache_invalidated_total";
const METRIC_CLEANUP_MS: &str = "penwell_cache_cleanup_ms";

const FIELD_EXPIRES_AT: &str = "expiresAt";
const FIELD_TAGS: &str = "tags";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode cache payload for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cached entry `{key}` could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Persistent,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Persistent => "persistent",
        }
    }
}

/// Outcome of [`CacheService::try_get`].
#[derive(Debug)]
pub enum CacheLookup<T> {
    Hit { value: T, tier: Tier },
    Miss,
    /// The lookup failed; callers treat this as a miss.
    Degraded(CacheError),
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            CacheLookup::Hit { value, .. } => Some(value),
            CacheLookup::Miss | CacheLookup::Degraded(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub memory_removed: usize,
    pub persistent_removed: usize,
    /// Persistent deletes that failed and were left behind.
    pub failed: usize,
    /// Tags whose lookup failed; their entries may survive until expiry.
    pub failed_tags: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub memory_expired: usize,
    pub persistent_expired: usize,
    pub failed: usize,
}

pub struct CacheService {
    config: CacheConfig,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    memory: MemoryTier,
}

impl CacheService {
    pub fn new(config: CacheConfig, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            memory: MemoryTier::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Entries currently held by the in-process tier, live or not.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let (entry, tier) = match self.lookup(key).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                counter!(METRIC_MISS).increment(1);
                debug!(key, "cache miss");
                return CacheLookup::Miss;
            }
            Err(err) => return CacheLookup::Degraded(err),
        };

        match serde_json::from_value(entry.data) {
            Ok(value) => {
                counter!(METRIC_HIT, "tier" => tier.as_str()).increment(1);
                debug!(key, tier = tier.as_str(), "cache hit");
                CacheLookup::Hit { value, tier }
            }
            Err(source) => CacheLookup::Degraded(CacheError::Decode {
                key: key.to_string(),
                source,
            }),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            CacheLookup::Degraded(err) => {
                degraded("get", key, &err);
                None
            }
            lookup => lookup.into_value(),
        }
    }

    /// Store `value` in both tiers. `ttl` of `None` or zero uses the default.
    pub async fn try_set<T, S>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[S],
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let data = serde_json::to_value(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        let ttl = self.config.resolve_ttl(ttl);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry::new(key, data, self.clock.now_millis(), ttl_ms, tags);

        let document = serde_json::to_value(&entry).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;

        if self.config.enable_memory_tier {
            self.memory.insert(entry);
        }
        self.store
            .set_document(&self.config.collection, key, document)
            .await?;
        debug!(key, ttl_ms, "cache entry written");
        Ok(())
    }

    pub async fn set<T, S>(&self, key: &str, value: &T, ttl: Option<Duration>, tags: &[S])
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        if let Err(err) = self.try_set(key, value, ttl, tags).await {
            degraded("set", key, &err);
        }
    }

    pub async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        self.memory.remove(key);
        self.store
            .delete_document(&self.config.collection, key)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.try_delete(key).await {
            degraded("delete", key, &err);
        }
    }

    /// Remove every entry carrying at least one of `tags`, in both tiers.
    ///
    /// Each tag's matches are deleted as soon as its query returns, so one
    /// failing tag does not leave the others in place. Failed tags are logged
    /// and counted; an error is returned only when no tag could be queried.
    pub async fn try_clear_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
    ) -> Result<InvalidationReport, CacheError> {
        let mut report = InvalidationReport {
            memory_removed: self.memory.remove_tagged(tags),
            ..InvalidationReport::default()
        };

        let mut seen = BTreeSet::new();
        let mut last_error = None;
        for tag in tags {
            let tag = tag.as_ref();
            let matches = match self
                .store
                .query_array_contains(
                    &self.config.collection,
                    FIELD_TAGS,
                    &Value::String(tag.to_string()),
                )
                .await
            {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(tag, error = %err, "failed to query cache entries by tag");
                    report.failed_tags += 1;
                    last_error = Some(err);
                    continue;
                }
            };

            let fresh: Vec<String> = matches
                .into_iter()
                .map(|(key, _)| key)
                .filter(|key| seen.insert(key.clone()))
                .collect();
            let (removed, failed) = self.delete_persistent(fresh).await;
            report.persistent_removed += removed;
            report.failed += failed;
        }

        if let Some(err) = last_error
            && report.failed_tags == tags.len()
        {
            return Err(err.into());
        }
        counter!(METRIC_INVALIDATED).increment(report.persistent_removed as u64);

        let tags: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
        info!(
            ?tags,
            memory_removed = report.memory_removed,
            persistent_removed = report.persistent_removed,
            failed = report.failed,
            failed_tags = report.failed_tags,
            "cleared cache entries by tag"
        );
        Ok(report)
    }

    pub async fn clear_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> InvalidationReport {
        match self.try_clear_by_tags(tags).await {
            Ok(report) => report,
            Err(err) => {
                let tags: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
                degraded("clear_by_tags", &tags.join(","), &err);
                InvalidationReport::default()
            }
        }
    }

    pub async fn try_clear_all(&self) -> Result<InvalidationReport, CacheError> {
        let memory_removed = self.memory.clear();
        let documents = self.store.list_documents(&self.config.collection).await?;
        let (persistent_removed, failed) = self
            .delete_persistent(documents.into_iter().map(|(key, _)| key))
            .await;

        let report = InvalidationReport {
            memory_removed,
            persistent_removed,
            failed,
            ..InvalidationReport::default()
        };
        counter!(METRIC_INVALIDATED).increment(report.persistent_removed as u64);
        info!(
            memory_removed = report.memory_removed,
            persistent_removed = report.persistent_removed,
            failed = report.failed,
            "cleared entire cache"
        );
        Ok(report)
    }

    pub async fn clear_all(&self) -> InvalidationReport {
        self.try_clear_all().await.unwrap_or_else(|err| {
            degraded("clear_all", "*", &err);
            InvalidationReport::default()
        })
    }

    /// Drop expired entries from both tiers.
    pub async fn try_cleanup(&self) -> Result<CleanupReport, CacheError> {
        let started_at = Instant::now();
        let now = self.clock.now_millis();
        let memory_expired = self.memory.purge_expired(now);

        let expired = self
            .store
            .query_by_field_less_or_equal(&self.config.collection, FIELD_EXPIRES_AT, &json!(now))
            .await?;
        let (persistent_expired, failed) = self
            .delete_persistent(expired.into_iter().map(|(key, _)| key))
            .await;

        histogram!(METRIC_CLEANUP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        let report = CleanupReport {
            memory_expired,
            persistent_expired,
            failed,
        };
        info!(
            memory_expired = report.memory_expired,
            persistent_expired = report.persistent_expired,
            failed = report.failed,
            "cache cleanup finished"
        );
        Ok(report)
    }

    pub async fn cleanup(&self) -> CleanupReport {
        self.try_cleanup().await.unwrap_or_else(|err| {
            degraded("cleanup", "*", &err);
            CleanupReport::default()
        })
    }

    /// Return the cached value for `key`, or produce, store and return it.
    ///
    /// Concurrent misses for the same key each run `fetch`. Errors from
    /// `fetch` propagate; cache failures do not.
    pub async fn get_or_set<T, S, F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
        tags: &[S],
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        S: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        self.set(key, &value, ttl, tags).await;
        Ok(value)
    }

    async fn lookup(&self, key: &str) -> Result<Option<(CacheEntry, Tier)>, CacheError> {
        let now = self.clock.now_millis();
        if self.config.enable_memory_tier
            && let Some(entry) = self.memory.get(key, now)
        {
            return Ok(Some((entry, Tier::Memory)));
        }

        let Some(document) = self
            .store
            .get_document(&self.config.collection, key)
            .await?
        else {
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_value(document).map_err(|source| CacheError::Decode {
                key: key.to_string(),
                source,
            })?;

        if entry.is_expired_at(now) {
            debug!(key, expires_at = entry.expires_at, "dropping expired cache entry");
            self.store
                .delete_document(&self.config.collection, key)
                .await?;
            return Ok(None);
        }

        if self.config.enable_memory_tier {
            self.memory.insert(entry.clone());
        }
        Ok(Some((entry, Tier::Persistent)))
    }

    /// Delete `keys` from the persistent tier concurrently. Returns
    /// `(removed, failed)`.
    async fn delete_persistent<I>(&self, keys: I) -> (usize, usize)
    where
        I: IntoIterator<Item = String>,
    {
        let collection = self.config.collection.as_str();
        let results = join_all(keys.into_iter().map(|key| async move {
            let outcome = self.store.delete_document(collection, &key).await;
            (key, outcome)
        }))
        .await;

        let mut removed = 0;
        let mut failed = 0;
        for (key, outcome) in results {
            match outcome {
                Ok(()) => removed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(key = %key, error = %err, "failed to delete cache entry");
                }
            }
        }
        (removed, failed)
    }
}

fn degraded(op: &'static str, key: &str, err: &CacheError) {
    counter!(METRIC_DEGRADED, "op" => op).increment(1);
    warn!(op, key, error = %err, "cache operation failed; continuing without cache");
}
