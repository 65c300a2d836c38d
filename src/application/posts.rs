//! Cached reads and plain writes for posts.
//!
//! Interaction fields are never written here; see
//! [`InteractionService`](super::interactions::InteractionService).

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheKeys, CacheService, CacheTags, Clock};
use crate::domain::entities::PostRecord;
use crate::domain::slug::unique_slug;
use crate::domain::types::PostStatus;

use super::error::AppError;
use super::repos::{DocumentStore, POSTS_COLLECTION, decode, encode};
use super::transaction::{TransactionError, TransactionPolicy, run_transaction};

#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub title: String,
    pub content: String,
    pub author: String,
    pub status: PostStatus,
    pub meta_description: String,
    pub tags: Vec<String>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostCommand {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub meta_description: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub(crate) fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub struct PostService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheService>,
    clock: Arc<dyn Clock>,
    policy: TransactionPolicy,
}

impl PostService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheService>,
        clock: Arc<dyn Clock>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            policy,
        }
    }

    pub async fn create_post(&self, command: CreatePostCommand) -> Result<PostRecord, AppError> {
        ensure_non_empty(&command.author, "author")?;

        let slug = self.free_slug(&command.title).await?;

        let now = self.clock.now();
        let post = PostRecord {
            id: Uuid::new_v4().to_string(),
            title: command.title.trim().to_string(),
            slug,
            content: command.content,
            author: command.author,
            status: command.status,
            meta_description: command.meta_description,
            tags: normalize_tags(command.tags),
            created_at: now,
            updated_at: now,
            likes: Vec::new(),
            dislikes: Vec::new(),
            like_count: 0,
            dislike_count: 0,
            comment_count: 0,
        };

        let document = encode(POSTS_COLLECTION, &post.id, &post)?;
        self.store
            .set_document(POSTS_COLLECTION, &post.id, document)
            .await?;
        info!(post_id = %post.id, slug = %post.slug, "post created");

        self.invalidate(&post.id).await;
        Ok(post)
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<PostRecord>, AppError> {
        let key = CacheKeys::post(id);
        if let Some(post) = self.cache.get::<PostRecord>(&key).await {
            return Ok(Some(post));
        }

        let Some(document) = self.store.get_document(POSTS_COLLECTION, id).await? else {
            return Ok(None);
        };
        let post: PostRecord = decode(POSTS_COLLECTION, id, document)?;

        let mut tags = vec![CacheTags::POSTS.to_string()];
        tags.extend(post.tags.iter().map(|tag| CacheTags::post_topic(tag)));
        self.cache
            .set(&key, &post, Some(self.cache.config().entity_ttl), &tags)
            .await;
        Ok(Some(post))
    }

    /// All posts, newest first.
    pub async fn list_posts(&self) -> Result<Vec<PostRecord>, AppError> {
        self.cache
            .get_or_set(
                &CacheKeys::all_posts(),
                || async {
                    let documents = self.store.list_documents(POSTS_COLLECTION).await?;
                    decode_posts(documents)
                },
                Some(self.cache.config().list_ttl),
                &[CacheTags::POSTS],
            )
            .await
    }

    pub async fn published_posts(&self) -> Result<Vec<PostRecord>, AppError> {
        self.cached_query(
            &CacheKeys::published_posts(),
            "status",
            json!(PostStatus::Published.as_str()),
            &[CacheTags::POSTS],
        )
        .await
    }

    /// Unpublished posts, newest first.
    pub async fn draft_posts(&self) -> Result<Vec<PostRecord>, AppError> {
        self.cached_query(
            &CacheKeys::draft_posts(),
            "status",
            json!(PostStatus::Draft.as_str()),
            &[CacheTags::POSTS],
        )
        .await
    }

    pub async fn posts_by_author(&self, author_id: &str) -> Result<Vec<PostRecord>, AppError> {
        self.cached_query(
            &CacheKeys::posts_by_author(author_id),
            "author",
            json!(author_id),
            &[CacheTags::POSTS],
        )
        .await
    }

    pub async fn posts_by_tag(&self, tag: &str) -> Result<Vec<PostRecord>, AppError> {
        let tag = tag.trim().to_lowercase();
        let topic = CacheTags::post_topic(&tag);
        self.cache
            .get_or_set(
                &CacheKeys::posts_by_tag(&tag),
                || async {
                    let documents = self
                        .store
                        .query_array_contains(POSTS_COLLECTION, "tags", &json!(tag))
                        .await?;
                    decode_posts(documents)
                },
                Some(self.cache.config().list_ttl),
                &[CacheTags::POSTS, topic.as_str()],
            )
            .await
    }

    /// Published posts matching `query` in title, body, description or tags.
    ///
    /// A blank query returns nothing and is not cached.
    pub async fn search_posts(&self, query: &str) -> Result<Vec<PostRecord>, AppError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        self.cache
            .get_or_set(
                &CacheKeys::post_search(&needle),
                || async {
                    let published = self
                        .store
                        .query_by_field_equals(
                            POSTS_COLLECTION,
                            "status",
                            &json!(PostStatus::Published.as_str()),
                        )
                        .await?;
                    let mut posts = decode_posts(published)?;
                    posts.retain(|post| post.matches_search(&needle));
                    Ok::<_, AppError>(posts)
                },
                Some(self.cache.config().search_ttl),
                &[CacheTags::POSTS],
            )
            .await
    }

    /// Merge `command` into the stored post.
    ///
    /// Runs as a transaction so a concurrent like or comment is not lost.
    pub async fn update_post(
        &self,
        id: &str,
        command: UpdatePostCommand,
    ) -> Result<PostRecord, AppError> {
        if let Some(title) = &command.title {
            ensure_non_empty(title, "title")?;
        }
        let updated_at = self.clock.now();

        let post = run_transaction(
            self.store.as_ref(),
            &self.policy,
            POSTS_COLLECTION,
            id,
            |document| merge_update(id, document, &command, updated_at),
        )
        .await?;
        info!(post_id = %id, "post updated");

        self.invalidate(id).await;
        Ok(post)
    }

    pub async fn delete_post(&self, id: &str) -> Result<(), AppError> {
        if self
            .store
            .get_document(POSTS_COLLECTION, id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("post", id));
        }
        self.store.delete_document(POSTS_COLLECTION, id).await?;
        info!(post_id = %id, "post deleted");

        self.invalidate(id).await;
        self.cache.delete(&CacheKeys::comments_for_post(id)).await;
        Ok(())
    }

    /// Give every post without a slug one derived from its title.
    ///
    /// Returns the number of posts updated. A post that gained a slug
    /// concurrently is left as it is.
    pub async fn backfill_slugs(&self) -> Result<usize, AppError> {
        let documents = self.store.list_documents(POSTS_COLLECTION).await?;
        let mut updated = 0;

        for (id, document) in documents {
            let post: PostRecord = decode(POSTS_COLLECTION, &id, document)?;
            if !post.slug.trim().is_empty() {
                continue;
            }

            let slug = match self.free_slug(&post.title).await {
                Ok(slug) => slug,
                Err(AppError::Domain(err)) => {
                    warn!(post_id = %id, error = %err, "cannot derive slug; skipping post");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let assigned = run_transaction(
                self.store.as_ref(),
                &self.policy,
                POSTS_COLLECTION,
                &id,
                |mut document| {
                    let fields = document.as_object_mut().ok_or_else(|| {
                        TransactionError::aborted("post document is not an object")
                    })?;
                    let current = fields.get("slug").and_then(Value::as_str).unwrap_or("");
                    if !current.trim().is_empty() {
                        return Ok((document, false));
                    }
                    fields.insert("slug".to_string(), json!(slug));
                    Ok((document, true))
                },
            )
            .await?;

            if assigned {
                info!(post_id = %id, slug = %slug, "slug backfilled");
                self.invalidate(&id).await;
                updated += 1;
            }
        }

        info!(updated, "slug backfill complete");
        Ok(updated)
    }

    async fn free_slug(&self, title: &str) -> Result<String, AppError> {
        let store = self.store.clone();
        unique_slug(title, move |candidate| {
            let store = store.clone();
            async move {
                let existing = store
                    .query_by_field_equals(POSTS_COLLECTION, "slug", &Value::String(candidate))
                    .await?;
                Ok::<_, AppError>(!existing.is_empty())
            }
        })
        .await
    }

    async fn cached_query(
        &self,
        key: &str,
        field: &str,
        value: Value,
        tags: &[&str],
    ) -> Result<Vec<PostRecord>, AppError> {
        self.cache
            .get_or_set(
                key,
                || async {
                    let documents = self
                        .store
                        .query_by_field_equals(POSTS_COLLECTION, field, &value)
                        .await?;
                    decode_posts(documents)
                },
                Some(self.cache.config().list_ttl),
                tags,
            )
            .await
    }

    async fn invalidate(&self, id: &str) {
        self.cache.delete(&CacheKeys::post(id)).await;
        self.cache.clear_by_tags(&[CacheTags::POSTS]).await;
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn decode_posts(documents: Vec<(String, Value)>) -> Result<Vec<PostRecord>, AppError> {
    let mut posts = documents
        .into_iter()
        .map(|(key, document)| decode::<PostRecord>(POSTS_COLLECTION, &key, document))
        .collect::<Result<Vec<_>, _>>()?;
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(posts)
}

/// Apply the editable fields of `command` to a stored post.
fn merge_update(
    id: &str,
    document: Value,
    command: &UpdatePostCommand,
    updated_at: time::OffsetDateTime,
) -> Result<(Value, PostRecord), TransactionError> {
    let mut post: PostRecord = decode(POSTS_COLLECTION, id, document)?;

    if let Some(title) = &command.title {
        post.title = title.trim().to_string();
    }
    if let Some(content) = &command.content {
        post.content.clone_from(content);
    }
    if let Some(status) = command.status {
        post.status = status;
    }
    if let Some(meta_description) = &command.meta_description {
        post.meta_description.clone_from(meta_description);
    }
    if let Some(tags) = &command.tags {
        post.tags = normalize_tags(tags.clone());
    }
    post.updated_at = updated_at;

    let document = encode(POSTS_COLLECTION, id, &post)?;
    Ok((document, post))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_lowercased_and_deduplicated() {
        let tags = vec![" AI ".to_string(), "ai".to_string(), String::new(), "Rust".to_string()];
        assert_eq!(normalize_tags(tags), vec!["ai".to_string(), "rust".to_string()]);
    }

    #[test]
    fn merge_keeps_interaction_fields() {
        let document = json!({
            "id": "p1",
            "title": "Old",
            "slug": "old",
            "content": "body",
            "author": "u1",
            "status": "Draft",
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-01T10:00:00Z",
            "likes": ["a"],
            "likeCount": 1,
            "commentCount": 4
        });
        let command = UpdatePostCommand {
            title: Some("New".to_string()),
            status: Some(PostStatus::Published),
            ..UpdatePostCommand::default()
        };

        let (next, post) = merge_update(
            "p1",
            document,
            &command,
            time::macros::datetime!(2024-06-01 00:00 UTC),
        )
        .expect("merge");

        assert_eq!(post.title, "New");
        assert_eq!(post.slug, "old");
        assert_eq!(next["likes"], json!(["a"]));
        assert_eq!(next["likeCount"], json!(1));
        assert_eq!(next["commentCount"], json!(4));
        assert_eq!(next["status"], json!("Published"));
    }
}
