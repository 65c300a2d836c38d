//! Composition root for the application services.

use std::sync::Arc;

use crate::cache::{CacheConfig, CacheService, Clock, SystemClock};
use crate::config::Settings;

use super::comments::CommentService;
use super::interactions::InteractionService;
use super::posts::PostService;
use super::repos::DocumentStore;
use super::transaction::TransactionPolicy;
use super::users::UserService;

/// Every service shares the one [`CacheService`] built here.
#[derive(Clone)]
pub struct AppContext {
    pub cache: Arc<CacheService>,
    pub interactions: Arc<InteractionService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub users: Arc<UserService>,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        cache_config: CacheConfig,
        policy: TransactionPolicy,
    ) -> Self {
        let cache = Arc::new(CacheService::new(cache_config, store.clone(), clock.clone()));
        let interactions = Arc::new(InteractionService::new(
            store.clone(),
            cache.clone(),
            policy,
        ));
        let posts = Arc::new(PostService::new(
            store.clone(),
            cache.clone(),
            clock.clone(),
            policy,
        ));
        let comments = Arc::new(CommentService::new(
            store.clone(),
            cache.clone(),
            clock,
            interactions.clone(),
        ));
        let users = Arc::new(UserService::new(store, cache.clone(), policy));

        Self {
            cache,
            interactions,
            posts,
            comments,
            users,
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            CacheConfig::from(&settings.cache),
            TransactionPolicy::from(&settings.transactions),
        )
    }
}
