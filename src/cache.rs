use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Entry<V> {
    value: V,
    // None means the entry never expires.
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory map whose entries expire after a per-entry TTL.
pub struct TtlCache<K, V> {
    items: RwLock<HashMap<K, Entry<V>>>,
    // Bumped under the write lock by every invalidation.
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        TtlCache { items: RwLock::new(HashMap::new()), generation: AtomicU64::new(0), clock }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, Entry<V>>> {
        self.items.read().unwrap_or_else(|poisoned| {
            log::error!("RwLock for cache entries was poisoned! Recovering lock.");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, Entry<V>>> {
        self.items.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for cache entries was poisoned! Recovering lock.");
            poisoned.into_inner()
        })
    }

    /// Stores `value` under `key`. A `ttl` of `None` (or a non-positive
    /// duration) keeps the entry until it is deleted or the cache cleared.
    pub fn set(&self, key: K, value: V, ttl: Option<chrono::Duration>) {
        let entry = self.entry(value, ttl);
        self.write().insert(key, entry);
    }

    fn entry(&self, value: V, ttl: Option<chrono::Duration>) -> Entry<V> {
        let expires_at = ttl
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .map(|ttl| self.clock.now() + ttl);
        Entry { value, expires_at }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let items = self.read();
        let entry = items.get(key)?;
        match entry.expires_at {
            Some(expires_at) if now > expires_at => None,
            _ => Some(entry.value.clone()),
        }
    }

    pub fn delete(&self, key: &K) {
        let mut items = self.write();
        items.remove(key);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clear(&self) {
        let mut items = self.write();
        items.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let mut items = self.write();
        let before = items.len();
        items.retain(|_, entry| entry.expires_at.map_or(true, |expires_at| now <= expires_at));
        before - items.len()
    }

    /// Returns the cached value or computes, stores and returns a fresh one.
    /// Errors from `fill` are passed through and nothing is stored. A value
    /// computed while a `delete` or `clear` ran is returned but not stored.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, ttl: Option<chrono::Duration>, fill: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let value = fill()?;
        let entry = self.entry(value.clone(), ttl);
        let mut items = self.write();
        if self.generation.load(Ordering::Acquire) == generation {
            items.insert(key, entry);
        }
        Ok(value)
    }
}
