//! Postgres document store behaviour.
//!
//! - Marked `#[ignore]`; run with `DATABASE_URL` pointing at a scratch
//!   database and `cargo test -- --ignored`.
//! - Each test gets a fresh database with `./migrations` applied.

use std::sync::Arc;
use std::time::Duration;

use penwell::application::repos::{CasOutcome, DocumentStore};
use penwell::cache::{CacheConfig, CacheService, ManualClock};
use penwell::infra::db::PostgresDocumentStore;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn compare_and_swap_detects_stale_versions(pool: PgPool) {
    let store = PostgresDocumentStore::new(pool);
    store
        .set_document("posts", "p1", json!({"likeCount": 0}))
        .await
        .expect("seed");

    let read = store
        .get_versioned("posts", "p1")
        .await
        .expect("read")
        .expect("exists");

    let first = store
        .compare_and_swap("posts", "p1", read.version, json!({"likeCount": 1}))
        .await
        .expect("cas");
    let second = store
        .compare_and_swap("posts", "p1", read.version, json!({"likeCount": 2}))
        .await
        .expect("cas");
    let missing = store
        .compare_and_swap("posts", "nope", 1, json!({}))
        .await
        .expect("cas");

    assert_eq!(first, CasOutcome::Applied);
    assert_eq!(second, CasOutcome::Conflict);
    assert_eq!(missing, CasOutcome::Missing);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn jsonb_queries_back_tag_and_expiry_lookups(pool: PgPool) {
    let store = Arc::new(PostgresDocumentStore::new(pool));
    let clock = Arc::new(ManualClock::default());
    let cache = CacheService::new(
        CacheConfig {
            enable_memory_tier: false,
            ..CacheConfig::default()
        },
        store.clone(),
        clock.clone(),
    );

    cache
        .try_set("posts:all", &json!([]), Some(Duration::from_secs(5)), &["posts"])
        .await
        .expect("set");
    cache
        .try_set("users:all", &json!([]), Some(Duration::from_secs(600)), &["users"])
        .await
        .expect("set");
    cache
        .try_set("posts:tag:ai", &json!([]), None, &["posts", "tag:ai"])
        .await
        .expect("set");

    let report = cache.try_clear_by_tags(&["tag:ai"]).await.expect("clear");
    assert_eq!(report.persistent_removed, 1);

    clock.advance(Duration::from_secs(5));
    let cleanup = cache.try_cleanup().await.expect("cleanup");
    assert_eq!(cleanup.persistent_expired, 1);

    let remaining = store.list_documents("cache").await.expect("list");
    let keys: Vec<&str> = remaining.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["users:all"]);
}
