//! Comments and the comment counter on their post.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheKeys, CacheService, CacheTags, Clock};
use crate::domain::entities::CommentRecord;

use super::error::AppError;
use super::interactions::InteractionService;
use super::posts::ensure_non_empty;
use super::repos::{COMMENTS_COLLECTION, DocumentStore, POSTS_COLLECTION, decode, encode};

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
}

pub struct CommentService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheService>,
    clock: Arc<dyn Clock>,
    interactions: Arc<InteractionService>,
}

impl CommentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheService>,
        clock: Arc<dyn Clock>,
        interactions: Arc<InteractionService>,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            interactions,
        }
    }

    /// Store a comment and bump its post's `commentCount`.
    ///
    /// Only the post's comment list is invalidated; the cached post keeps its
    /// old count until it expires. Comments on a missing post are rejected
    /// before anything is written, and a comment whose counter update fails
    /// is removed again.
    pub async fn add_comment(&self, comment: NewComment) -> Result<CommentRecord, AppError> {
        ensure_non_empty(&comment.post_id, "post_id")?;
        ensure_non_empty(&comment.content, "content")?;
        if self
            .store
            .get_document(POSTS_COLLECTION, &comment.post_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("post", &comment.post_id));
        }

        let record = CommentRecord {
            id: Uuid::new_v4().to_string(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_name: comment.author_name,
            author_avatar: comment.author_avatar,
            content: comment.content,
            created_at: self.clock.now(),
        };
        let document = encode(COMMENTS_COLLECTION, &record.id, &record)?;
        self.store
            .set_document(COMMENTS_COLLECTION, &record.id, document)
            .await?;

        if let Err(err) = self
            .interactions
            .increment_comment_count(&record.post_id)
            .await
        {
            warn!(
                comment_id = %record.id,
                post_id = %record.post_id,
                error = %err,
                "post counter was not updated; withdrawing comment"
            );
            if let Err(cleanup) = self
                .store
                .delete_document(COMMENTS_COLLECTION, &record.id)
                .await
            {
                warn!(
                    comment_id = %record.id,
                    error = %cleanup,
                    "failed to withdraw orphaned comment"
                );
            }
            return Err(err.into());
        }

        info!(comment_id = %record.id, post_id = %record.post_id, "comment added");
        self.cache
            .delete(&CacheKeys::comments_for_post(&record.post_id))
            .await;
        Ok(record)
    }

    /// Comments on `post_id`, newest first.
    pub async fn comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, AppError> {
        self.cache
            .get_or_set(
                &CacheKeys::comments_for_post(post_id),
                || async {
                    let documents = self
                        .store
                        .query_by_field_equals(COMMENTS_COLLECTION, "postId", &json!(post_id))
                        .await?;
                    let mut comments = documents
                        .into_iter()
                        .map(|(key, document)| {
                            decode::<CommentRecord>(COMMENTS_COLLECTION, &key, document)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    Ok::<_, AppError>(comments)
                },
                Some(self.cache.config().list_ttl),
                &[CacheTags::COMMENTS],
            )
            .await
    }
}
