//! Process-local [`DocumentStore`].
//!
//! Backs tests and single-process deployments. Versions start at 1 and are
//! bumped on every write, so compare-and-swap behaves like the Postgres
//! adapter.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::repos::{CasOutcome, Document, DocumentStore, StoreError, Versioned};
use crate::util::lock::{read_guard, write_guard};

const SOURCE: &str = "infra::memory";

type Collection = BTreeMap<String, Versioned>;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        read_guard(&self.collections, SOURCE, "count")
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn select<P>(&self, collection: &str, op: &'static str, predicate: P) -> Vec<(String, Document)>
    where
        P: Fn(&Document) -> bool,
    {
        read_guard(&self.collections, SOURCE, op)
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, entry)| predicate(&entry.document))
                    .map(|(key, entry)| (key.clone(), entry.document.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Order two JSON scalars of the same kind; mixed kinds are incomparable.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(read_guard(&self.collections, SOURCE, "get_document")
            .get(collection)
            .and_then(|docs| docs.get(key))
            .map(|entry| entry.document.clone()))
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        value: Document,
    ) -> Result<(), StoreError> {
        let mut collections = write_guard(&self.collections, SOURCE, "set_document");
        let docs = collections.entry(collection.to_string()).or_default();
        let version = docs.get(key).map_or(1, |entry| entry.version + 1);
        docs.insert(
            key.to_string(),
            Versioned {
                version,
                document: value,
            },
        );
        Ok(())
    }

    async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        if let Some(docs) =
            write_guard(&self.collections, SOURCE, "delete_document").get_mut(collection)
        {
            docs.remove(key);
        }
        Ok(())
    }

    async fn query_by_field_less_or_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.select(collection, "query_le", |doc| {
            doc.get(field)
                .and_then(|candidate| compare_values(candidate, value))
                .is_some_and(Ordering::is_le)
        }))
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.select(collection, "query_array_contains", |doc| {
            doc.get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value))
        }))
    }

    async fn query_by_field_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.select(collection, "query_eq", |doc| doc.get(field) == Some(value)))
    }

    async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.select(collection, "list_documents", |_| true))
    }

    async fn get_versioned(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Versioned>, StoreError> {
        Ok(read_guard(&self.collections, SOURCE, "get_versioned")
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &str,
        expected_version: u64,
        value: Document,
    ) -> Result<CasOutcome, StoreError> {
        let mut collections = write_guard(&self.collections, SOURCE, "compare_and_swap");
        let Some(entry) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
        else {
            return Ok(CasOutcome::Missing);
        };

        if entry.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }

        entry.version += 1;
        entry.document = value;
        Ok(CasOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn writes_bump_versions() {
        let store = InMemoryDocumentStore::new();
        store.set_document("c", "k", json!({ "v": 1 })).await.expect("set");
        store.set_document("c", "k", json!({ "v": 2 })).await.expect("set");

        let versioned = store.get_versioned("c", "k").await.expect("read").expect("exists");
        assert_eq!(versioned.version, 2);
        assert_eq!(versioned.document, json!({ "v": 2 }));
    }

    #[tokio::test]
    async fn stale_compare_and_swap_conflicts() {
        let store = InMemoryDocumentStore::new();
        store.set_document("c", "k", json!({ "v": 1 })).await.expect("set");
        let read = store.get_versioned("c", "k").await.expect("read").expect("exists");

        store.set_document("c", "k", json!({ "v": 9 })).await.expect("concurrent write");

        let outcome = store
            .compare_and_swap("c", "k", read.version, json!({ "v": 2 }))
            .await
            .expect("cas");
        assert_eq!(outcome, CasOutcome::Conflict);
        assert_eq!(
            store.get_document("c", "k").await.expect("read"),
            Some(json!({ "v": 9 }))
        );
    }

    #[tokio::test]
    async fn compare_and_swap_on_missing_document() {
        let store = InMemoryDocumentStore::new();
        let outcome = store
            .compare_and_swap("c", "gone", 1, json!({}))
            .await
            .expect("cas");
        assert_eq!(outcome, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        store.delete_document("c", "never-existed").await.expect("delete");
        store.set_document("c", "k", json!({})).await.expect("set");
        store.delete_document("c", "k").await.expect("delete");
        store.delete_document("c", "k").await.expect("delete again");
        assert_eq!(store.count("c"), 0);
    }

    #[tokio::test]
    async fn field_queries_filter_documents() {
        let store = InMemoryDocumentStore::new();
        store
            .set_document("c", "a", json!({ "at": 10, "tags": ["posts"], "owner": "x" }))
            .await
            .expect("set");
        store
            .set_document("c", "b", json!({ "at": 30, "tags": ["users"], "owner": "y" }))
            .await
            .expect("set");

        let expired = store
            .query_by_field_less_or_equal("c", "at", &json!(10))
            .await
            .expect("query");
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "a");

        let tagged = store
            .query_array_contains("c", "tags", &json!("users"))
            .await
            .expect("query");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].0, "b");

        let owned = store
            .query_by_field_equals("c", "owner", &json!("x"))
            .await
            .expect("query");
        assert_eq!(owned[0].0, "a");
    }
}
