//! Penwell: a two-tier read-through cache with tag invalidation, and the
//! interaction counters that invalidate it, over a generic document store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

mod util;
