//! Domain entities mirrored from the document store.
//!
//! Field names follow the persisted camelCase layout so records can be
//! round-tripped through `serde_json::Value` documents unchanged.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::interactions::InteractionState;
use crate::domain::types::{PostStatus, UserRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub content: String,
    pub author: String,
    pub status: PostStatus,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    // Interaction fields are written only by the interaction transaction.
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub dislike_count: u64,
    #[serde(default)]
    pub comment_count: u64,
}

impl PostRecord {
    pub fn interactions(&self) -> InteractionState {
        InteractionState::new(self.likes.clone(), self.dislikes.clone())
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    /// Case-insensitive match against title, body, description and tags.
    ///
    /// `needle` must already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.meta_description.to_lowercase().contains(needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_avatar: Option<String>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample_post() -> PostRecord {
        PostRecord {
            id: "p1".to_string(),
            title: "Tuning Postgres".to_string(),
            slug: "tuning-postgres".to_string(),
            content: "Autovacuum matters.".to_string(),
            author: "u1".to_string(),
            status: PostStatus::Published,
            meta_description: String::new(),
            tags: vec!["Databases".to_string()],
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-01 10:00 UTC),
            likes: Vec::new(),
            dislikes: Vec::new(),
            like_count: 0,
            dislike_count: 0,
            comment_count: 0,
        }
    }

    #[test]
    fn post_document_uses_camel_case_fields() {
        let value = serde_json::to_value(sample_post()).expect("serialize post");
        assert!(value.get("likeCount").is_some());
        assert!(value.get("commentCount").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("like_count").is_none());
    }

    #[test]
    fn missing_interaction_fields_default_to_empty() {
        let mut value = serde_json::to_value(sample_post()).expect("serialize post");
        let object = value.as_object_mut().expect("object");
        object.remove("likes");
        object.remove("likeCount");

        let post: PostRecord = serde_json::from_value(value).expect("deserialize post");
        assert!(post.likes.is_empty());
        assert_eq!(post.like_count, 0);
    }

    #[test]
    fn search_matches_tags_and_title() {
        let post = sample_post();
        assert!(post.matches_search("postgres"));
        assert!(post.matches_search("databases"));
        assert!(!post.matches_search("rust"));
    }

    #[test]
    fn user_profile_keeps_photo_url_spelling() {
        let profile = UserProfile {
            uid: "u1".into(),
            email: "a@example.com".into(),
            display_name: "Ada".into(),
            photo_url: None,
            role: UserRole::Author,
        };
        let value = serde_json::to_value(profile).expect("serialize profile");
        assert!(value.get("photoURL").is_some());
    }
}
