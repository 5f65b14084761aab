//! Bounded TTL cache.
//!
//! Entries expire `ttl` after insertion as measured by an injected
//! [`Clock`]. When full, the oldest entry is evicted.

use chrono::{DateTime, Duration, Utc};
use harvest_core::{Clock, SystemClock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CacheSlot<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// A capacity-bounded map whose entries expire.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheSlot<V>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Time-to-live of each entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, slot: &CacheSlot<V>, now: DateTime<Utc>) -> bool {
        now - slot.inserted_at >= self.ttl
    }

    /// Returns a live entry, dropping it if it has expired.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let expired = self.entries.get(key).map(|slot| self.is_expired(slot, now))?;
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|slot| slot.value.clone())
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            CacheSlot {
                value,
                inserted_at: now,
            },
        );
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// Drops every expired entry; returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, slot| now - slot.inserted_at < ttl);
        before - self.entries.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.inserted_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Number of stored entries, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
