//! Application services over the document store and the cache.

pub mod comments;
pub mod context;
pub mod error;
pub mod interactions;
pub mod posts;
pub mod repos;
pub mod transaction;
pub mod users;
