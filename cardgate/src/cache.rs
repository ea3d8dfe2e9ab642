//! In-memory TTL cache.
//!
//! Entries are checked for expiry lazily on read; nothing is ever evicted in
//! the background. An expired entry stays readable through
//! [`TtlCache::get_stale`] until it is overwritten or removed, which is what
//! lets the gateway degrade to old data when an upstream misbehaves.
//!
//! The cache has no capacity bound. Card and resource identifiers form a
//! fixed, known set, so the key space does not grow with traffic.

use std::fmt;
use std::time::Duration;

use cardgate_core::{CacheKey, CacheValue};
use dashmap::DashMap;
use tokio::time::Instant;

/// Key to value store with per-entry expiry.
pub struct TtlCache<T> {
    entries: DashMap<CacheKey, CacheValue<T>>,
}

impl<T> TtlCache<T>
where
    T: Clone,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the value for `key` if it has not expired yet.
    pub fn get_fresh(&self, key: &CacheKey) -> Option<T> {
        let entry = self.entries.get(key)?;
        entry
            .is_fresh_at(Instant::now())
            .then(|| entry.data().clone())
    }

    /// Returns the value for `key` whether or not it has expired.
    pub fn get_stale(&self, key: &CacheKey) -> Option<T> {
        self.entries.get(key).map(|entry| entry.data().clone())
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// A zero `ttl` means the caller opted out of caching: nothing is stored
    /// and any previous entry is left untouched. Returns whether the value was
    /// stored.
    pub fn set(&self, key: CacheKey, value: T, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        self.entries.insert(key, CacheValue::with_ttl(value, ttl));
        true
    }

    /// Removes the entry for `key`, returning its value.
    pub fn remove(&self, key: &CacheKey) -> Option<T> {
        self.entries
            .remove(key)
            .map(|(_, value)| value.into_inner())
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TtlCache<T>
where
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
