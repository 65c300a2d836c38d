//! Interaction counters and the cache invalidation that follows them.
//!
//! All writes to a post's `likes`, `dislikes`, `likeCount`, `dislikeCount`
//! and `commentCount` go through this service so the counts always match the
//! sets they summarize.

use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheKeys, CacheService, CacheTags};
use crate::domain::interactions::{InteractionChange, InteractionState};
use crate::domain::types::InteractionType;

use super::repos::{Document, DocumentStore, POSTS_COLLECTION};
use super::transaction::{TransactionError, TransactionPolicy, run_transaction};

const FIELD_LIKES: &str = "likes";
const FIELD_DISLIKES: &str = "dislikes";
const FIELD_LIKE_COUNT: &str = "likeCount";
const FIELD_DISLIKE_COUNT: &str = "dislikeCount";
const FIELD_COMMENT_COUNT: &str = "commentCount";

const ACTION_INTERACTION: &str = "update interaction";
const ACTION_COMMENT_COUNT: &str = "increment comment count";

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("failed to {action}: post `{post_id}` does not exist")]
    PostNotFound {
        action: &'static str,
        post_id: String,
    },
    #[error("failed to {action} on post `{post_id}`: {source}")]
    Failed {
        action: &'static str,
        post_id: String,
        #[source]
        source: TransactionError,
    },
}

impl InteractionError {
    fn from_transaction(action: &'static str, post_id: &str, source: TransactionError) -> Self {
        match source {
            TransactionError::NotFound { .. } => Self::PostNotFound {
                action,
                post_id: post_id.to_string(),
            },
            source => Self::Failed {
                action,
                post_id: post_id.to_string(),
                source,
            },
        }
    }
}

/// Committed state after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionSummary {
    pub change: InteractionChange,
    pub like_count: u64,
    pub dislike_count: u64,
}

pub struct InteractionService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheService>,
    policy: TransactionPolicy,
}

impl InteractionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheService>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Toggle `user_id`'s like or dislike on `post_id`.
    ///
    /// The post entry and everything tagged `posts` are invalidated after the
    /// commit; invalidation failures are logged by the cache and not returned.
    pub async fn update_interaction(
        &self,
        post_id: &str,
        user_id: &str,
        kind: InteractionType,
    ) -> Result<InteractionSummary, InteractionError> {
        let summary = run_transaction(
            self.store.as_ref(),
            &self.policy,
            POSTS_COLLECTION,
            post_id,
            |document| toggle(document, user_id, kind),
        )
        .await
        .map_err(|err| InteractionError::from_transaction(ACTION_INTERACTION, post_id, err))?;

        info!(
            post_id,
            user_id,
            kind = kind.as_str(),
            change = ?summary.change,
            like_count = summary.like_count,
            dislike_count = summary.dislike_count,
            "interaction committed"
        );

        self.cache.delete(&CacheKeys::post(post_id)).await;
        self.cache.clear_by_tags(&[CacheTags::POSTS]).await;
        Ok(summary)
    }

    /// Add one to the post's comment count and return the new value.
    ///
    /// The cached post is left alone, so readers may see the previous count
    /// until the entry expires.
    pub async fn increment_comment_count(&self, post_id: &str) -> Result<u64, InteractionError> {
        let count = run_transaction(
            self.store.as_ref(),
            &self.policy,
            POSTS_COLLECTION,
            post_id,
            |mut document| {
                let fields = fields_mut(&mut document)?;
                let next = fields
                    .get(FIELD_COMMENT_COUNT)
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    .saturating_add(1);
                fields.insert(FIELD_COMMENT_COUNT.to_string(), json!(next));
                Ok((document, next))
            },
        )
        .await
        .map_err(|err| InteractionError::from_transaction(ACTION_COMMENT_COUNT, post_id, err))?;

        debug!(post_id, comment_count = count, "comment count incremented");
        Ok(count)
    }
}

fn fields_mut(
    document: &mut Document,
) -> Result<&mut serde_json::Map<String, Value>, TransactionError> {
    document
        .as_object_mut()
        .ok_or_else(|| TransactionError::aborted("post document is not an object"))
}

fn read_members(
    fields: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Vec<String>, TransactionError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| TransactionError::aborted(format!("`{field}` is malformed: {err}"))),
    }
}

/// Apply one toggle to a post document, rewriting sets and counts together.
fn toggle(
    mut document: Document,
    user_id: &str,
    kind: InteractionType,
) -> Result<(Document, InteractionSummary), TransactionError> {
    let fields = fields_mut(&mut document)?;
    let mut state = InteractionState::new(
        read_members(fields, FIELD_LIKES)?,
        read_members(fields, FIELD_DISLIKES)?,
    );

    let change = state.apply(user_id, kind);
    state
        .validate_user(user_id)
        .map_err(|err| TransactionError::aborted(err.to_string()))?;

    let summary = InteractionSummary {
        change,
        like_count: state.like_count(),
        dislike_count: state.dislike_count(),
    };
    fields.insert(FIELD_LIKE_COUNT.to_string(), json!(summary.like_count));
    fields.insert(FIELD_DISLIKE_COUNT.to_string(), json!(summary.dislike_count));
    fields.insert(FIELD_LIKES.to_string(), json!(state.likes));
    fields.insert(FIELD_DISLIKES.to_string(), json!(state.dislikes));

    Ok((document, summary))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, ManualClock};
    use crate::infra::memory::InMemoryDocumentStore;

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        cache: Arc<CacheService>,
        service: InteractionService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cache = Arc::new(CacheService::new(
            CacheConfig::default(),
            store.clone(),
            Arc::new(ManualClock::default()),
        ));
        let policy = TransactionPolicy {
            max_attempts: NonZeroU32::MIN,
            backoff: Duration::ZERO,
        };
        let service = InteractionService::new(store.clone(), cache.clone(), policy);
        Fixture {
            store,
            cache,
            service,
        }
    }

    async fn seed_post(store: &InMemoryDocumentStore, id: &str) {
        store
            .set_document(
                POSTS_COLLECTION,
                id,
                json!({
                    "id": id,
                    "title": "T",
                    "likes": [],
                    "dislikes": [],
                    "likeCount": 0,
                    "dislikeCount": 0
                }),
            )
            .await
            .expect("seed post");
    }

    #[test]
    fn toggle_rewrites_sets_and_counts_together() {
        let document = json!({
            "likes": ["b"],
            "dislikes": ["a"],
            "likeCount": 1,
            "dislikeCount": 1
        });

        let (next, summary) = toggle(document, "a", InteractionType::Like).expect("toggle");

        assert_eq!(summary.change, InteractionChange::Switched);
        assert_eq!(next["likes"], json!(["b", "a"]));
        assert_eq!(next["dislikes"], json!([]));
        assert_eq!(next["likeCount"], json!(2));
        assert_eq!(next["dislikeCount"], json!(0));
    }

    #[test]
    fn toggle_treats_missing_sets_as_empty() {
        let (next, summary) =
            toggle(json!({ "title": "T" }), "a", InteractionType::Dislike).expect("toggle");
        assert_eq!(summary.dislike_count, 1);
        assert_eq!(next["title"], json!("T"));
    }

    #[test]
    fn toggle_refuses_non_object_documents() {
        let err = toggle(json!([1, 2]), "a", InteractionType::Like).expect_err("not an object");
        assert!(matches!(err, TransactionError::Aborted(_)));
    }

    #[test]
    fn overlap_from_another_user_does_not_abort_toggle() {
        let document = json!({ "likes": ["x"], "dislikes": ["x"] });

        let (next, summary) = toggle(document, "a", InteractionType::Dislike).expect("toggle");

        assert_eq!(summary.change, InteractionChange::Added);
        assert_eq!(summary.dislike_count, 2);
        assert_eq!(next["dislikes"], json!(["x", "a"]));
        assert_eq!(next["dislikeCount"], json!(2));
    }

    #[tokio::test]
    async fn like_invalidates_post_entry_and_posts_tag() {
        let fx = fixture();
        seed_post(&fx.store, "p1").await;
        let tags = [CacheTags::POSTS];
        fx.cache.set(&CacheKeys::post("p1"), &json!({}), None, &tags).await;
        fx.cache.set(&CacheKeys::all_posts(), &json!([]), None, &tags).await;
        fx.cache.set(&CacheKeys::all_users(), &json!([]), None, &[CacheTags::USERS]).await;

        fx.service
            .update_interaction("p1", "a", InteractionType::Like)
            .await
            .expect("like");

        assert!(fx.cache.get::<Value>(&CacheKeys::post("p1")).await.is_none());
        assert!(fx.cache.get::<Value>(&CacheKeys::all_posts()).await.is_none());
        assert!(fx.cache.get::<Value>(&CacheKeys::all_users()).await.is_some());
    }

    #[tokio::test]
    async fn missing_post_is_terminal() {
        let fx = fixture();

        let err = fx
            .service
            .update_interaction("ghost", "a", InteractionType::Like)
            .await
            .expect_err("missing post");

        assert!(matches!(err, InteractionError::PostNotFound { .. }));
        assert!(err.to_string().starts_with("failed to update interaction"));
        assert_eq!(fx.store.count(POSTS_COLLECTION), 0);
    }

    #[tokio::test]
    async fn comment_count_increments_without_touching_cache() {
        let fx = fixture();
        seed_post(&fx.store, "p1").await;
        fx.cache
            .set(&CacheKeys::post("p1"), &json!({ "commentCount": 0 }), None, &[CacheTags::POSTS])
            .await;

        assert_eq!(fx.service.increment_comment_count("p1").await.expect("inc"), 1);
        assert_eq!(fx.service.increment_comment_count("p1").await.expect("inc"), 2);

        let stored = fx
            .store
            .get_document(POSTS_COLLECTION, "p1")
            .await
            .expect("read")
            .expect("post");
        assert_eq!(stored["commentCount"], json!(2));
        let cached = fx.cache.get::<Value>(&CacheKeys::post("p1")).await;
        assert_eq!(cached, Some(json!({ "commentCount": 0 })));
    }
}
