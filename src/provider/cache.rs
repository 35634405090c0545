//! LRU cache of payment hash → charge reference.
//!
//! Sits in front of the durable [`ChargeMappingStore`](crate::ChargeMappingStore)
//! so repeated verification of a recent invoice does not touch the store.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// LRU cache of charge references keyed by payment hash.
#[derive(Clone)]
pub struct ChargeCache {
    inner: Arc<Mutex<LruCache<String, String>>>,
    stats: Arc<Mutex<CacheStats>>,
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl ChargeCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Look up the charge reference for a payment hash.
    pub fn get(&self, payment_hash: &str) -> Option<String> {
        let found = self.inner.lock().get(payment_hash).cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Remember the charge reference for a payment hash.
    pub fn insert(&self, payment_hash: &str, charge_id: &str) {
        self.inner
            .lock()
            .put(payment_hash.to_string(), charge_id.to_string());
        self.stats.lock().additions += 1;
    }

    /// Forget the charge reference for a payment hash.
    pub fn remove(&self, payment_hash: &str) -> Option<String> {
        self.inner.lock().pop(payment_hash)
    }

    /// Payment hash cached for `charge_id`. Does not touch recency or stats.
    #[must_use]
    pub fn hash_for_charge(&self, charge_id: &str) -> Option<String> {
        self.inner
            .lock()
            .iter()
            .find(|(_, cached)| cached.as_str() == charge_id)
            .map(|(hash, _)| hash.clone())
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ChargeCache {
    fn default() -> Self {
        Self::new()
    }
}
