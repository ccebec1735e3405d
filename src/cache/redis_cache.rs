use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, AsyncConnectionConfig, RedisError};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::Order;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::{decode_snapshot, encode_snapshot, CacheError, OrderCache};

/// Redis-backed order cache.
///
/// The multiplexed connection is opened lazily and dropped after I/O errors,
/// so the service starts even while Redis is down and reconnects once it is
/// back. All calls go through a circuit breaker, and every connect, command
/// and response is bounded by `op_timeout`.
pub struct RedisOrderCache {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    breaker: CircuitBreaker,
    op_timeout: Duration,
    ping_timeout: Duration,
}

impl RedisOrderCache {
    pub fn new(url: &str, op_timeout: Duration, ping_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: 3,
            open_for: Duration::from_secs(10),
            success_threshold: 1,
        };

        Ok(Self {
            client,
            connection: Mutex::new(None),
            breaker: CircuitBreaker::new("redis_cache", breaker_config),
            op_timeout,
            ping_timeout,
        })
    }

    // The lock only guards the slot; connecting happens outside it so a
    // stalled handshake cannot queue every caller behind it.
    async fn connection(&self) -> Result<MultiplexedConnection, RedisError> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.op_timeout)
            .set_response_timeout(self.op_timeout);
        let conn = self.client.get_multiplexed_async_connection_with_config(&config).await?;

        let mut slot = self.connection.lock().await;
        match slot.as_ref() {
            Some(existing) => Ok(existing.clone()),
            None => {
                tracing::info!("Connected to Redis");
                *slot = Some(conn.clone());
                Ok(conn)
            }
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, CacheError>
    where
        T: Send,
        F: std::future::Future<Output = Result<T, RedisError>> + Send,
    {
        let result = self
            .breaker
            .call(async {
                match tokio::time::timeout(self.op_timeout, fut).await {
                    Ok(result) => result.map_err(OpFailure::Redis),
                    Err(_) => Err(OpFailure::TimedOut),
                }
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen) => {
                Err(CacheError::Unavailable("circuit breaker open".to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(OpFailure::TimedOut)) => {
                *self.connection.lock().await = None;
                Err(CacheError::Unavailable(format!(
                    "{op} timed out after {}ms",
                    self.op_timeout.as_millis()
                )))
            }
            Err(CircuitBreakerError::OperationFailed(OpFailure::Redis(e))) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
                    *self.connection.lock().await = None;
                }
                if e.is_timeout() {
                    return Err(CacheError::Unavailable(format!("{op} timed out: {e}")));
                }
                Err(CacheError::Backend(e))
            }
        }
    }
}

#[derive(Debug)]
enum OpFailure {
    Redis(RedisError),
    TimedOut,
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, order_uid: &str) -> Result<Order, CacheError> {
        let raw = self
            .bounded("get", async {
                let mut conn = self.connection().await?;
                let raw: Option<String> = conn.get(order_uid).await?;
                Ok::<_, RedisError>(raw)
            })
            .await?;

        match raw {
            Some(raw) => decode_snapshot(&raw),
            None => Err(CacheError::Miss),
        }
    }

    async fn set(&self, order_uid: &str, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let payload = encode_snapshot(order)?;
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        self.bounded("set", async {
            let mut conn = self.connection().await?;
            let _: () = conn.pset_ex(order_uid, payload, ttl_ms).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let probe = async {
            let mut conn = self.connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await
        };

        match tokio::time::timeout(self.ping_timeout, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                *self.connection.lock().await = None;
                Err(CacheError::Backend(e))
            }
            Err(_) => Err(CacheError::Unavailable(format!(
                "ping timed out after {}ms",
                self.ping_timeout.as_millis()
            ))),
        }
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.connection.lock().await.take().is_some() {
            tracing::info!("Redis connection closed");
        }
        Ok(())
    }
}
