//! Process-wide TTL cache backing the IP-range and certificate verifiers.
//!
//! Entries expire passively: an expired entry is dropped on the next lookup.
//! Concurrent requests may race to repopulate an expired entry; the last
//! writer wins and the extra fetches are bounded by the number of racers.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed cache where every entry lives for a fixed TTL.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up a live entry. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Insert a value with the cache-wide TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
