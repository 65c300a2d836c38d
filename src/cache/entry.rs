//! Cached value as persisted in the shared tier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached value. Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CacheEntry {
    pub fn new<S: AsRef<str>>(
        key: &str,
        data: Value,
        created_at: i64,
        ttl_ms: i64,
        tags: &[S],
    ) -> Self {
        Self {
            key: key.to_string(),
            data,
            created_at,
            expires_at: created_at.saturating_add(ttl_ms),
            tags: tags.iter().map(|tag| tag.as_ref().to_string()).collect(),
        }
    }

    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter()
            .any(|wanted| self.tags.iter().any(|tag| tag == wanted.as_ref()))
    }
}
