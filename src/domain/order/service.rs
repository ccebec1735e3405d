use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheError, OrderCache};
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;
use super::errors::ServiceError;

// ============================================================================
// Order Service - the Order Processor
// ============================================================================
//
// The single place order rules live. Every entry point (HTTP create, queue
// message) goes through `create_order`, so validation and uniqueness are
// enforced the same way no matter where the order came from.
//
// Read path (cache-aside):
//   cache hit          -> return, store untouched
//   cache miss         -> store read -> repopulate cache -> return
//   cache error        -> log, store read, no repopulation
//   cache too slow     -> treated as a cache error
//   store NotFound     -> NotFound, cache untouched
//
// ============================================================================

const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    cache_ttl: Duration,
    cache_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        cache_ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            metrics,
        }
    }

    /// Bound on each cache GET/SET before the read path gives up on the cache
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Validate and persist a new order
    pub async fn create_order(&self, order: &Order) -> Result<(), ServiceError> {
        if let Err(e) = order.validate() {
            let err = ServiceError::from(e);
            self.metrics.record_order_failure("create", err.kind());
            return Err(err);
        }

        let started = Instant::now();
        let result = self.store.create(order).await;
        self.metrics.observe_store("create", started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.metrics.orders_created.inc();
                tracing::info!(
                    order_uid = %order.order_uid,
                    item_count = order.items.len(),
                    "✅ Order persisted"
                );
                Ok(())
            }
            Err(e) => {
                let err = ServiceError::from(e);
                self.metrics.record_order_failure("create", err.kind());
                if let ServiceError::Internal(ref cause) = err {
                    tracing::error!(order_uid = %order.order_uid, error = %format!("{cause:#}"), "Failed to persist order");
                }
                Err(err)
            }
        }
    }

    /// Look an order up, cache first
    pub async fn get_order_by_id(&self, order_uid: &str) -> Result<Order, ServiceError> {
        if order_uid.is_empty() {
            self.metrics.record_order_failure("get", "empty_uid");
            return Err(ServiceError::EmptyUid);
        }

        match self.cache_get(order_uid).await {
            Ok(order) => {
                self.metrics.record_cache_lookup("hit");
                tracing::debug!(order_uid = %order_uid, "Cache hit");
                Ok(order)
            }
            Err(CacheError::Miss) => {
                self.metrics.record_cache_lookup("miss");
                tracing::debug!(order_uid = %order_uid, "Cache miss, reading from store");

                let order = self.load_from_store(order_uid).await?;
                self.repopulate(&order).await;
                Ok(order)
            }
            Err(e) => {
                self.metrics.record_cache_lookup("error");
                tracing::warn!(
                    order_uid = %order_uid,
                    error = %e,
                    "⚠️ Cache unavailable, serving from store without repopulating"
                );
                self.load_from_store(order_uid).await
            }
        }
    }

    /// Decode a raw queue payload and create the order it carries
    pub async fn handle_order(&self, message: &[u8]) -> Result<Order, ServiceError> {
        let order = match Order::from_json(message) {
            Ok(order) => order,
            Err(e) => {
                self.metrics.record_order_failure("handle", "malformed");
                return Err(ServiceError::Malformed(e));
            }
        };

        self.create_order(&order).await?;
        Ok(order)
    }

    async fn load_from_store(&self, order_uid: &str) -> Result<Order, ServiceError> {
        let started = Instant::now();
        let result = self.store.get_by_id(order_uid).await;
        self.metrics.observe_store("get_by_id", started.elapsed().as_secs_f64());

        result.map_err(|e| {
            let err = ServiceError::from(e);
            self.metrics.record_order_failure("get", err.kind());
            if let ServiceError::Internal(ref cause) = err {
                tracing::error!(order_uid = %order_uid, error = %format!("{cause:#}"), "Failed to read order");
            }
            err
        })
    }

    async fn cache_get(&self, order_uid: &str) -> Result<Order, CacheError> {
        tokio::time::timeout(self.cache_timeout, self.cache.get(order_uid))
            .await
            .unwrap_or_else(|_| Err(self.cache_timed_out("get")))
    }

    fn cache_timed_out(&self, op: &str) -> CacheError {
        CacheError::Unavailable(format!("{op} timed out after {}ms", self.cache_timeout.as_millis()))
    }

    async fn repopulate(&self, order: &Order) {
        let write = self.cache.set(&order.order_uid, order, self.cache_ttl);
        let result = tokio::time::timeout(self.cache_timeout, write)
            .await
            .unwrap_or_else(|_| Err(self.cache_timed_out("set")));

        if let Err(e) = result {
            self.metrics.cache_write_failures.inc();
            tracing::warn!(
                order_uid = %order.order_uid,
                error = %e,
                "Failed to repopulate cache"
            );
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
