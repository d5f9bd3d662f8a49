//! Time-expiring cache with single-flight fills.
//!
//! Every key owns a slot guarded by its own async mutex. A caller that misses
//! holds the slot's lock for the duration of the fill, so concurrent callers
//! for the same key wait for that one fill and then read its result. Keys
//! never contend with each other beyond the map's shard locks, which are
//! only held for slot lookup. Failed fills leave the slot empty.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type Slot<V> = Arc<Mutex<Option<Entry<V>>>>;

/// Cache key for the metrics provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub name: String,
    pub metric: String,
}

impl CacheKey {
    pub fn new(namespace: &str, name: &str, metric: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            metric: metric.to_string(),
        }
    }
}

pub struct ExpiringCache<K, V> {
    ttl: Duration,
    slots: DashMap<K, Slot<V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, key: &K) -> Slot<V> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    /// Returns the cached value for `key`, or runs `fill` to produce it.
    ///
    /// At most one `fill` per key runs at a time. An `Err` from `fill` is
    /// returned to this caller only and nothing is stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &K, fill: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        let value = fill().await?;
        *entry = Some(Entry {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    /// Returns the value for `key` if present and not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        let entry = slot.lock().await;
        entry
            .as_ref()
            .filter(|e| e.is_fresh(Instant::now()))
            .map(|e| e.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let slot = self.slot(&key);
        *slot.lock().await = Some(Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Removes expired and empty slots. Slots in use are kept.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();

        self.slots.retain(|_, slot| {
            // someone holds the slot outside the map
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(entry) => entry.as_ref().is_some_and(|e| e.is_fresh(now)),
                Err(_) => true,
            }
        });

        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
