// ============================================================================
// Order Cache - best-effort snapshot layer
// ============================================================================
//
// Holds full serialized Order snapshots keyed by order_uid with a TTL.
// Never the system of record: every entry can be rebuilt from the store,
// and no write path waits on it.
//
// `CacheError::Miss` is an expected outcome, not a failure. Everything else
// means the cache could not answer and the caller should degrade.
//
// ============================================================================

mod memory;
mod redis_cache;

use async_trait::async_trait;
use std::time::Duration;

use crate::models::Order;

pub use self::memory::InMemoryOrderCache;
pub use self::redis_cache::RedisOrderCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("redis error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cache snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Return the cached snapshot, or `CacheError::Miss` if absent or expired
    async fn get(&self, order_uid: &str) -> Result<Order, CacheError>;

    /// Store a snapshot, replacing any existing entry
    async fn set(&self, order_uid: &str, order: &Order, ttl: Duration) -> Result<(), CacheError>;

    /// Advisory health check with a short bound
    async fn ping(&self) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError>;
}

pub(crate) fn encode_snapshot(order: &Order) -> Result<String, CacheError> {
    Ok(serde_json::to_string(order)?)
}

pub(crate) fn decode_snapshot(raw: &str) -> Result<Order, CacheError> {
    Ok(serde_json::from_str(raw)?)
}
