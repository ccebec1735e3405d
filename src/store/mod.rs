// ============================================================================
// Order Store - System of Record
// ============================================================================
//
// Persists an Order across the normalized orders / deliveries / payments /
// items tables and serves point lookups by order_uid.
//
// Two variants:
// - PgOrderStore:       Postgres via sqlx, one transaction per create
// - InMemoryOrderStore: HashMap-backed double with call counters
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::models::Order;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} already exists")]
    DuplicateKey(String),

    #[error("order {0} not found")]
    NotFound(String),

    #[error("store failure: {0:#}")]
    Internal(anyhow::Error),
}

impl StoreError {
    /// Wrap an unexpected backend failure with the operation that hit it
    pub fn internal<E>(context: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Internal(anyhow::Error::new(err).context(context))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order and all of its parts as one atomic unit.
    ///
    /// Fails with `DuplicateKey` if the order_uid is already stored.
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    /// Load the complete aggregate. A missing part is reported as `NotFound`.
    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Cheap connectivity check for health reporting
    async fn ping(&self) -> Result<(), StoreError>;
}
