use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::Order;
use super::{decode_snapshot, encode_snapshot, CacheError, OrderCache};

struct Entry {
    snapshot: String,
    expires_at: Instant,
}

/// In-process cache with TTL expiry, used by tests and local runs.
///
/// Snapshots are stored serialized, the same way Redis holds them.
#[derive(Default)]
pub struct InMemoryOrderCache {
    entries: Mutex<HashMap<String, Entry>>,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend: every call fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    /// Entries held, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.lock()
            .get(order_uid)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderCache for InMemoryOrderCache {
    async fn get(&self, order_uid: &str) -> Result<Order, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut entries = self.lock();
        match entries.get(order_uid) {
            Some(entry) if entry.expires_at > Instant::now() => decode_snapshot(&entry.snapshot),
            Some(_) => {
                entries.remove(order_uid);
                Err(CacheError::Miss)
            }
            None => Err(CacheError::Miss),
        }
    }

    async fn set(&self, order_uid: &str, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let now = Instant::now();
        let entry = Entry {
            snapshot: encode_snapshot(order)?,
            expires_at: now + ttl,
        };

        // Expired keys that are never read again would otherwise stay forever
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(order_uid.to_string(), entry);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_available()
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::generate_random_order;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryOrderCache::new();
        let order = generate_random_order();

        cache.set(&order.order_uid, &order, Duration::from_secs(60)).await.unwrap();
        let cached = cache.get(&order.order_uid).await.unwrap();

        assert_eq!(cached, order);
    }

    #[tokio::test]
    async fn test_absent_key_is_miss() {
        let cache = InMemoryOrderCache::new();
        let err = cache.get("absent").await.unwrap_err();
        assert!(err.is_miss());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryOrderCache::new();
        let order = generate_random_order();

        cache.set(&order.order_uid, &order, Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&order.order_uid).await.unwrap_err().is_miss());
        assert!(!cache.contains(&order.order_uid));
    }

    #[tokio::test]
    async fn test_write_drops_expired_entries() {
        let cache = InMemoryOrderCache::new();
        for _ in 0..5 {
            let order = generate_random_order();
            cache.set(&order.order_uid, &order, Duration::from_millis(10)).await.unwrap();
        }
        assert_eq!(cache.len(), 5);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = generate_random_order();
        cache.set(&fresh.order_uid, &fresh, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&fresh.order_uid));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = InMemoryOrderCache::new();
        let mut order = generate_random_order();
        cache.set(&order.order_uid, &order, Duration::from_secs(60)).await.unwrap();

        order.locale = "ru".to_string();
        cache.set(&order.order_uid, &order, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get(&order.order_uid).await.unwrap().locale, "ru");
    }

    #[tokio::test]
    async fn test_unavailable_is_not_a_miss() {
        let cache = InMemoryOrderCache::new();
        cache.set_unavailable(true);

        let err = cache.get("any").await.unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));
        assert!(cache.ping().await.is_err());
    }
}
