/// Bounded in-process TTL store.
///
/// One keyed-TTL map backs the claims cache, the token blacklist, and the
/// verification-code rate counters. Entries expire lazily: an expired entry
/// is treated as absent on read and physically removed on the next write
/// pass. Capacity is a hard bound with two admission policies: `insert`
/// refuses the new entry when full, letting the caller drop it (claims
/// cache) or surface the refusal (revocations); `insert_or_evict` and
/// `update` always land by evicting the soonest-expiring entry, used by
/// the rate counters, where a dropped write would erase an in-force limit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Command returned by an [`TtlCache::update`] closure.
pub enum Update<V> {
    Keep,
    Put(V, Duration),
    Remove,
}

pub struct TtlCache<V> {
    inner: Mutex<HashMap<String, Entry<V>>>,
    capacity: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Inserts `value` under `key` with the given TTL.
    /// Returns false if the cache is full and the entry was dropped.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if map.len() >= self.capacity && !map.contains_key(key) {
            map.retain(|_, entry| entry.expires_at > now);
            if map.len() >= self.capacity {
                return false;
            }
        }

        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Inserts unconditionally. When the cache is full of live entries the
    /// soonest-expiring one is evicted to make room, so the write always
    /// lands. Returns true if a live entry was evicted.
    pub fn insert_or_evict(&self, key: &str, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let evicted = Self::make_room(&mut map, key, self.capacity, now);
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        evicted
    }

    /// Atomic read-modify-write under a single lock acquisition. `f` sees
    /// the live value (expired entries read as absent) and returns the
    /// command to apply plus a result for the caller. A `Put` always lands,
    /// evicting the soonest-expiring entry when the cache is full.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(Option<&V>) -> (Update<V>, R)) -> R {
        let now = Instant::now();
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let current = map
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());
        let (command, result) = f(current.as_ref());

        match command {
            Update::Keep => {}
            Update::Remove => {
                map.remove(key);
            }
            Update::Put(value, ttl) => {
                Self::make_room(&mut map, key, self.capacity, now);
                map.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at: now + ttl,
                    },
                );
            }
        }
        result
    }

    /// Prunes, then evicts the soonest-expiring entry if the map is still
    /// at capacity and `key` is not already present. Returns true if a
    /// live entry was evicted.
    fn make_room(
        map: &mut HashMap<String, Entry<V>>,
        key: &str,
        capacity: usize,
        now: Instant,
    ) -> bool {
        if map.len() < capacity || map.contains_key(key) {
            return false;
        }
        map.retain(|_, entry| entry.expires_at > now);
        if map.len() < capacity {
            return false;
        }
        let victim = map
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(k, _)| k.clone());
        match victim {
            Some(k) => {
                map.remove(&k);
                true
            }
            None => false,
        }
    }

    /// Returns the live value for `key`, if any. Expired entries read as
    /// absent even before physical removal.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(key).map(|entry| entry.value)
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        let map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
