//! Cache without automatic value computation.
//!
//! A miss returns `None`; the caller decides whether to compute and
//! [`put`](crate::traits::Cache::put) a value. [`ManualCache::get_or_compute`]
//! folds the two steps into one call, but only guarantees that the supplier
//! runs at most once *per call*: two threads missing the same key at the same
//! time may both compute. Use a [`LoadingCache`](crate::loading::LoadingCache)
//! when at most one computation per key is required.
//!
//! ## Example
//!
//! ```
//! use cachewright::prelude::*;
//!
//! let cache = CacheBuilder::<&str, u32>::new().maximum_size(2).unwrap().build().unwrap();
//! cache.put("a", 1);
//! cache.put("b", 2);
//! cache.get(&"a");
//! cache.put("c", 3);
//!
//! assert!(cache.contains_key(&"a"));
//! assert!(!cache.contains_key(&"b"));
//! assert_eq!(*cache.get_or_compute("d", |k| k.len() as u32), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{CacheConfiguration, MemoryPressure};
use crate::core::CacheCore;
use crate::stats::CacheStats;
use crate::traits::{Cache, ConcurrentCache};

/// Thread-safe cache populated explicitly by its callers.
///
/// Cloning is cheap and yields another handle to the same storage.
pub struct ManualCache<K, V> {
    core: Arc<CacheCore<K, V>>,
}

impl<K, V> ManualCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(config: CacheConfiguration<K, V>) -> Self {
        Self {
            core: Arc::new(CacheCore::new(config)),
        }
    }

    /// Returns the cached value for `key`, promoting it on a hit.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.core.get(key, true)
    }

    /// Returns the cached value, or computes, stores and returns one.
    ///
    /// The supplier runs outside the cache lock. If another caller stored a
    /// value for `key` meanwhile, that value wins and is returned.
    pub fn get_or_compute<F>(&self, key: K, supplier: F) -> Arc<V>
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(value) = self.core.get(&key, true) {
            return value;
        }
        let started = Instant::now();
        let value = Arc::new(supplier(&key));
        self.core.stats_counter().record_load_success(started.elapsed());
        self.core.insert_if_absent(key, value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) with a fallible supplier.
    ///
    /// On error nothing is stored and the error is returned unchanged.
    pub fn try_get_or_compute<F, E>(&self, key: K, supplier: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(value) = self.core.get(&key, true) {
            return Ok(value);
        }
        let started = Instant::now();
        match supplier(&key) {
            Ok(value) => {
                self.core.stats_counter().record_load_success(started.elapsed());
                Ok(self.core.insert_if_absent(key, Arc::new(value)))
            },
            Err(err) => {
                self.core.stats_counter().record_load_failure(started.elapsed());
                Err(err)
            },
        }
    }

    /// Returns the cached values among `keys`; absent keys are left out.
    pub fn get_all_present<'a, I>(&self, keys: I) -> HashMap<K, Arc<V>>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        keys.into_iter()
            .filter_map(|key| self.core.get(key, true).map(|value| (key.clone(), value)))
            .collect()
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.core.debug_validate_invariants();
    }
}

impl<K, V> Cache<K, V> for ManualCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
        self.get(key)
    }

    fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        self.core.insert(key, Arc::new(value))
    }

    fn invalidate(&self, key: &K) -> Option<Arc<V>> {
        self.core.remove(key)
    }

    fn invalidate_all(&self) {
        self.core.clear();
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.contains_key(key)
    }

    fn len(&self) -> usize {
        self.core.len()
    }

    fn weighted_size(&self) -> u64 {
        self.core.weighted_size()
    }

    fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    fn clean_up(&self) -> usize {
        self.core.clean_up()
    }

    fn reclaim(&self, pressure: MemoryPressure) -> usize {
        self.core.reclaim(pressure)
    }

    fn configuration(&self) -> &CacheConfiguration<K, V> {
        self.core.config()
    }
}

impl<K, V> Clone for ManualCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K, V> fmt::Debug for ManualCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualCache")
            .field("len", &self.core.len())
            .field("weighted_size", &self.core.weighted_size())
            .field("eviction", &self.core.config().eviction().as_str())
            .finish()
    }
}

impl<K, V> ConcurrentCache for ManualCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
}
