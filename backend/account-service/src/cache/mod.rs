//! Session fast-path cache
//!
//! Holds validated session claims keyed by the raw credential a client
//! presented, plus a per-subject index of those keys so every cached session of
//! one account can be dropped at once.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod session_cache;

pub use session_cache::RedisSessionCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        CacheError::Backend(error.to_string())
    }
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Record `member` under `index`, refreshing the index expiry to `ttl`
    async fn add_to_index(&self, index: &str, member: &str, ttl: Duration)
        -> Result<(), CacheError>;

    /// Delete every key recorded under `index` and the index itself.
    /// Returns the number of member keys removed.
    async fn purge_index(&self, index: &str) -> Result<usize, CacheError>;
}
