//! Document-store collaborator consumed by the cache and the services.
//!
//! Documents are JSON objects addressed by `(collection, key)`. Every write
//! bumps a per-document version so optimistic transactions can detect
//! concurrent writers with [`DocumentStore::compare_and_swap`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub type Document = Value;

pub const POSTS_COLLECTION: &str = "posts";
pub const COMMENTS_COLLECTION: &str = "comments";
pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store timed out")]
    Timeout,
    #[error("malformed document `{collection}/{key}`: {message}")]
    Malformed {
        collection: String,
        key: String,
        message: String,
    },
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn malformed(collection: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            collection: collection.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Deserialize a stored document into an entity.
pub fn decode<T: DeserializeOwned>(
    collection: &str,
    key: &str,
    document: Document,
) -> Result<T, StoreError> {
    serde_json::from_value(document)
        .map_err(|err| StoreError::malformed(collection, key, err.to_string()))
}

/// Serialize an entity for storage.
pub fn encode<T: serde::Serialize>(
    collection: &str,
    key: &str,
    entity: &T,
) -> Result<Document, StoreError> {
    serde_json::to_value(entity)
        .map_err(|err| StoreError::malformed(collection, key, err.to_string()))
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub document: Document,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// Another writer committed since the expected version was read.
    Conflict,
    /// The document no longer exists.
    Missing,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, key: &str)
    -> Result<Option<Document>, StoreError>;

    /// Full overwrite, creating the document when absent.
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        value: Document,
    ) -> Result<(), StoreError>;

    /// Deleting an absent document succeeds.
    async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    async fn query_by_field_less_or_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    /// Documents whose array `field` contains `value`.
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    async fn query_by_field_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Document,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    async fn list_documents(&self, collection: &str)
    -> Result<Vec<(String, Document)>, StoreError>;

    async fn get_versioned(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Versioned>, StoreError>;

    /// Write `value` only if the stored version still equals `expected_version`.
    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &str,
        expected_version: u64,
        value: Document,
    ) -> Result<CasOutcome, StoreError>;
}
