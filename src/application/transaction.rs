//! Optimistic read-modify-write over a single document.
//!
//! [`run_transaction`] reads the current version, lets the caller compute the
//! replacement, and commits with compare-and-swap. A conflicting commit is
//! retried with linear backoff until the attempt budget is spent. The closure
//! may therefore run more than once and must be free of side effects.

use std::num::NonZeroU32;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use super::repos::{CasOutcome, Document, DocumentStore, StoreError};

const METRIC_TX_CONFLICT: &str = "penwell_tx_conflict_total";
const METRIC_TX_EXHAUSTED: &str = "penwell_tx_exhausted_total";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 20;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("document `{collection}/{key}` does not exist")]
    NotFound { collection: String, key: String },
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("gave up on `{collection}/{key}` after {attempts} conflicting attempts")]
    Exhausted {
        collection: String,
        key: String,
        attempts: u32,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransactionError {
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    fn not_found(collection: &str, key: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionPolicy {
    pub max_attempts: NonZeroU32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl From<&crate::config::TransactionSettings> for TransactionPolicy {
    fn from(settings: &crate::config::TransactionSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: settings.backoff,
        }
    }
}

/// Apply `apply` to `collection/key` atomically.
///
/// A missing document fails immediately with [`TransactionError::NotFound`];
/// an `Err` from `apply` aborts without writing. Neither is retried.
pub async fn run_transaction<S, T, F>(
    store: &S,
    policy: &TransactionPolicy,
    collection: &str,
    key: &str,
    mut apply: F,
) -> Result<T, TransactionError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Document) -> Result<(Document, T), TransactionError>,
{
    let max_attempts = policy.max_attempts.get();

    for attempt in 1..=max_attempts {
        let Some(current) = store.get_versioned(collection, key).await? else {
            return Err(TransactionError::not_found(collection, key));
        };

        let (next, output) = apply(current.document)?;

        match store
            .compare_and_swap(collection, key, current.version, next)
            .await?
        {
            CasOutcome::Applied => {
                debug!(collection, key, attempt, "transaction committed");
                return Ok(output);
            }
            CasOutcome::Missing => {
                return Err(TransactionError::not_found(collection, key));
            }
            CasOutcome::Conflict => {
                counter!(METRIC_TX_CONFLICT, "collection" => collection.to_string()).increment(1);
                debug!(
                    collection,
                    key,
                    attempt,
                    expected_version = current.version,
                    "transaction conflict; retrying"
                );
                if attempt < max_attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }

    counter!(METRIC_TX_EXHAUSTED, "collection" => collection.to_string()).increment(1);
    warn!(
        collection,
        key,
        attempts = max_attempts,
        "transaction retry budget exhausted"
    );
    Err(TransactionError::Exhausted {
        collection: collection.to_string(),
        key: key.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::repos::Versioned;
    use crate::infra::memory::InMemoryDocumentStore;

    /// Reports a conflict for the first `conflicts` commits.
    struct ContendedStore {
        inner: InMemoryDocumentStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for ContendedStore {
        async fn get_document(
            &self,
            collection: &str,
            key: &str,
        ) -> Result<Option<Document>, StoreError> {
            self.inner.get_document(collection, key).await
        }

        async fn set_document(
            &self,
            collection: &str,
            key: &str,
            value: Document,
        ) -> Result<(), StoreError> {
            self.inner.set_document(collection, key, value).await
        }

        async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError> {
            self.inner.delete_document(collection, key).await
        }

        async fn query_by_field_less_or_equal(
            &self,
            collection: &str,
            field: &str,
            value: &Document,
        ) -> Result<Vec<(String, Document)>, StoreError> {
            self.inner
                .query_by_field_less_or_equal(collection, field, value)
                .await
        }

        async fn query_array_contains(
            &self,
            collection: &str,
            field: &str,
            value: &Document,
        ) -> Result<Vec<(String, Document)>, StoreError> {
            self.inner
                .query_array_contains(collection, field, value)
                .await
        }

        async fn query_by_field_equals(
            &self,
            collection: &str,
            field: &str,
            value: &Document,
        ) -> Result<Vec<(String, Document)>, StoreError> {
            self.inner
                .query_by_field_equals(collection, field, value)
                .await
        }

        async fn list_documents(
            &self,
            collection: &str,
        ) -> Result<Vec<(String, Document)>, StoreError> {
            self.inner.list_documents(collection).await
        }

        async fn get_versioned(
            &self,
            collection: &str,
            key: &str,
        ) -> Result<Option<Versioned>, StoreError> {
            self.inner.get_versioned(collection, key).await
        }

        async fn compare_and_swap(
            &self,
            collection: &str,
            key: &str,
            expected_version: u64,
            value: Document,
        ) -> Result<CasOutcome, StoreError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(CasOutcome::Conflict);
            }
            self.inner
                .compare_and_swap(collection, key, expected_version, value)
                .await
        }
    }

    fn policy(max_attempts: u32) -> TransactionPolicy {
        TransactionPolicy {
            max_attempts: NonZeroU32::new(max_attempts).expect("non-zero attempts"),
            backoff: Duration::ZERO,
        }
    }

    fn increment(doc: Document) -> Result<(Document, i64), TransactionError> {
        let mut doc = doc;
        let next = doc["n"].as_i64().unwrap_or(0) + 1;
        doc["n"] = json!(next);
        Ok((doc, next))
    }

    #[tokio::test]
    async fn commits_on_first_attempt_without_contention() {
        let store = InMemoryDocumentStore::new();
        store
            .set_document("counters", "c", json!({ "n": 1 }))
            .await
            .expect("seed");

        let value = run_transaction(&store, &policy(3), "counters", "c", increment)
            .await
            .expect("commit");

        assert_eq!(value, 2);
        let stored = store.get_document("counters", "c").await.expect("read");
        assert_eq!(stored, Some(json!({ "n": 2 })));
    }

    #[tokio::test]
    async fn retries_conflicts_within_budget() {
        let store = ContendedStore {
            inner: InMemoryDocumentStore::new(),
            conflicts: AtomicU32::new(2),
        };
        store
            .set_document("counters", "c", json!({ "n": 0 }))
            .await
            .expect("seed");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);

        let value = run_transaction(&store, &policy(3), "counters", "c", move |doc| {
            seen.fetch_add(1, Ordering::SeqCst);
            increment(doc)
        })
        .await
        .expect("commit after retries");

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_terminal_and_writes_nothing() {
        let store = ContendedStore {
            inner: InMemoryDocumentStore::new(),
            conflicts: AtomicU32::new(10),
        };
        store
            .set_document("counters", "c", json!({ "n": 0 }))
            .await
            .expect("seed");

        let err = run_transaction(&store, &policy(2), "counters", "c", increment)
            .await
            .expect_err("budget exhausted");

        assert!(matches!(err, TransactionError::Exhausted { attempts: 2, .. }));
        let stored = store.get_document("counters", "c").await.expect("read");
        assert_eq!(stored, Some(json!({ "n": 0 })));
    }

    #[tokio::test]
    async fn missing_document_fails_without_running_closure() {
        let store = InMemoryDocumentStore::new();
        let mut ran = false;

        let err = run_transaction(&store, &policy(3), "counters", "absent", |doc| {
            ran = true;
            increment(doc)
        })
        .await
        .expect_err("missing document");

        assert!(matches!(err, TransactionError::NotFound { .. }));
        assert!(!ran);
    }

    #[tokio::test]
    async fn aborted_closure_is_not_retried() {
        let store = InMemoryDocumentStore::new();
        store
            .set_document("counters", "c", json!({ "n": 0 }))
            .await
            .expect("seed");
        let mut attempts = 0;

        let err = run_transaction(&store, &policy(5), "counters", "c", |_doc| {
            attempts += 1;
            Err::<(Document, ()), _>(TransactionError::aborted("refused"))
        })
        .await
        .expect_err("aborted");

        assert!(matches!(err, TransactionError::Aborted(_)));
        assert_eq!(attempts, 1);
    }
}
