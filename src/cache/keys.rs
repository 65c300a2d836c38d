//! Cache key builders and the invalidation tag vocabulary.
//!
//! Keys are opaque to the cache; these helpers only keep the naming
//! consistent between read paths and the write paths that invalidate them.

use url::form_urlencoded;

/// Conventional key names for cached reads.
pub struct CacheKeys;

impl CacheKeys {
    pub fn all_posts() -> String {
        "posts:all".to_string()
    }

    pub fn post(id: &str) -> String {
        format!("posts:{id}")
    }

    pub fn posts_by_author(author_id: &str) -> String {
        format!("posts:author:{author_id}")
    }

    pub fn published_posts() -> String {
        "posts:published".to_string()
    }

    pub fn draft_posts() -> String {
        "posts:drafts".to_string()
    }

    pub fn posts_by_tag(tag: &str) -> String {
        format!("posts:tag:{tag}")
    }

    /// Search keys are built from the lowercased, percent-encoded query.
    pub fn post_search(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        let encoded: String = form_urlencoded::byte_serialize(normalized.as_bytes()).collect();
        format!("posts:search:{encoded}")
    }

    pub fn comments_for_post(post_id: &str) -> String {
        format!("comments:post:{post_id}")
    }

    pub fn all_users() -> String {
        "users:all".to_string()
    }

    pub fn user(id: &str) -> String {
        format!("users:{id}")
    }
}

/// Fixed invalidation tags.
pub struct CacheTags;

impl CacheTags {
    pub const POSTS: &'static str = "posts";
    pub const COMMENTS: &'static str = "comments";
    pub const USERS: &'static str = "users";
    pub const MEDIA: &'static str = "media";

    /// Per-topic tag attached to posts carrying `tag`, e.g. `tag:ai`.
    pub fn post_topic(tag: &str) -> String {
        format!("tag:{}", tag.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_keys_follow_collection_prefix() {
        assert_eq!(CacheKeys::post("abc"), "posts:abc");
        assert_eq!(CacheKeys::user("u1"), "users:u1");
        assert_eq!(CacheKeys::comments_for_post("abc"), "comments:post:abc");
        assert_eq!(CacheKeys::posts_by_author("u1"), "posts:author:u1");
        assert_eq!(CacheKeys::draft_posts(), "posts:drafts");
    }

    #[test]
    fn search_key_is_normalized() {
        assert_eq!(
            CacheKeys::post_search("  Rust Async "),
            CacheKeys::post_search("rust async")
        );
        assert_eq!(CacheKeys::post_search("Rust & AI"), "posts:search:rust+%26+ai");
    }

    #[test]
    fn topic_tags_are_lowercased() {
        assert_eq!(CacheTags::post_topic("AI"), "tag:ai");
    }
}
