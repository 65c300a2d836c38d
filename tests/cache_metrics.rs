use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use penwell::application::context::AppContext;
use penwell::application::posts::CreatePostCommand;
use penwell::application::repos::DocumentStore;
use penwell::application::transaction::{TransactionPolicy, run_transaction};
use penwell::cache::{CacheConfig, CacheService, ManualClock};
use penwell::domain::types::{InteractionType, PostStatus};
use penwell::infra::memory::InMemoryDocumentStore;
use serde_json::json;

#[tokio::test]
async fn cache_and_transaction_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::default());
    let policy = TransactionPolicy {
        max_attempts: NonZeroU32::MIN,
        backoff: Duration::ZERO,
    };
    let ctx = AppContext::new(store.clone(), clock.clone(), CacheConfig::default(), policy);

    // Memory hit, miss and invalidation through the services.
    let post = ctx
        .posts
        .create_post(CreatePostCommand {
            title: "Metrics test post".to_string(),
            content: String::new(),
            author: "u1".to_string(),
            status: PostStatus::Published,
            meta_description: String::new(),
            tags: Vec::new(),
        })
        .await
        .expect("create post");
    ctx.posts.get_post(&post.id).await.expect("first read");
    ctx.posts.get_post(&post.id).await.expect("second read");
    ctx.interactions
        .update_interaction(&post.id, "u2", InteractionType::Like)
        .await
        .expect("like");

    // Persistent-tier hit from a second process-like instance.
    let shared_only = CacheService::new(
        CacheConfig {
            enable_memory_tier: false,
            ..CacheConfig::default()
        },
        store.clone(),
        clock.clone(),
    );
    ctx.cache.set("shared", &7_u32, None, &["posts"]).await;
    assert_eq!(shared_only.get::<u32>("shared").await, Some(7));

    // A type mismatch degrades to a miss.
    assert_eq!(shared_only.get::<Vec<String>>("shared").await, None);

    // Expired entries are reclaimed.
    clock.advance(Duration::from_secs(3_600));
    ctx.cache.cleanup().await;

    // A transaction that loses a race once, then exhausts its single attempt.
    store
        .set_document("counters", "c1", json!({"n": 0}))
        .await
        .expect("seed counter");
    let result = run_transaction(store.as_ref(), &policy, "counters", "c1", |document| {
        Ok((document, ()))
    })
    .await;
    assert!(result.is_ok());

    let racing = run_transaction(store.as_ref(), &policy, "counters", "c1", |document| {
        // Simulate a concurrent writer bumping the version under us.
        futures::executor::block_on(store.set_document("counters", "c1", json!({"n": 1})))
            .expect("concurrent write");
        Ok((document, ()))
    })
    .await;
    assert!(racing.is_err());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "penwell_cache_hit_total",
        "penwell_cache_miss_total",
        "penwell_cache_degraded_total",
        "penwell_cache_invalidated_total",
        "penwell_cache_cleanup_ms",
        "penwell_tx_conflict_total",
        "penwell_tx_exhausted_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
