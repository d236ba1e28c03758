use axum::async_trait;
use thiserror::Error;

mod redis;

pub use self::redis::RedisSessionCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort key-value store for login session snapshots. Implementations
/// must never be load-bearing: every entry is derived data that can vanish at
/// any time, and callers treat errors as misses.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key for a user's login snapshot. `email` must already be lowercased.
pub fn session_key(email: &str) -> String {
    format!("auth:user:{email}")
}

/// Stand-in used when Redis is not configured. Every lookup is a miss.
pub struct NoopSessionCache;

#[async_trait]
impl SessionCache for NoopSessionCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
