use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::Order;
use super::{OrderStore, StoreError};

/// HashMap-backed store for tests and local runs.
///
/// The existence check and the insert happen under one lock, so concurrent
/// creates for the same order_uid resolve to exactly one winner, just like
/// the primary key does in Postgres.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Internal`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Order>> {
        // A poisoned map still holds whole orders; inserts are single statements
        self.orders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Internal(anyhow::anyhow!("in-memory store marked unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut orders = self.lock();
        if orders.contains_key(&order.order_uid) {
            return Err(StoreError::DuplicateKey(order.order_uid.clone()));
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        self.lock()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::generate_random_order;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let store = InMemoryOrderStore::new();
        let order = generate_random_order();

        store.create(&order).await.unwrap();
        let loaded = store.get_by_id(&order.order_uid).await.unwrap();

        assert_eq!(loaded, order);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_not_overwritten() {
        let store = InMemoryOrderStore::new();
        let order = generate_random_order();
        store.create(&order).await.unwrap();

        let mut second = order.clone();
        second.track_number = "OTHER".to_string();
        let err = store.create(&second).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey(ref uid) if *uid == order.order_uid));
        let stored = store.get_by_id(&order.order_uid).await.unwrap();
        assert_eq!(stored.track_number, order.track_number);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let err = store.get_by_id("never-created").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_have_one_winner() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = generate_random_order();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let order = order.clone();
                tokio::spawn(async move { store.create(&order).await })
            })
            .collect();

        let mut ok = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::DuplicateKey(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_internal() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);

        let err = store.create(&generate_random_order()).await.unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
        assert!(store.ping().await.is_err());
        assert!(store.is_empty());
    }
}
