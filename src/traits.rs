//! # Cache Trait
//!
//! Operations shared by the two cache variants.
//!
//! ```text
//!                    ┌──────────────────────────────────────────┐
//!                    │              Cache<K, V>                 │
//!                    │                                          │
//!                    │  get_if_present(&K) → Option<Arc<V>>     │
//!                    │  put(K, V) / put_all(iter)               │
//!                    │  invalidate(&K) / invalidate_all()       │
//!                    │  contains_key / len / weighted_size      │
//!                    │  stats / clean_up / reclaim              │
//!                    └─────────────────────┬────────────────────┘
//!                                          │
//!                  ┌───────────────────────┴───────────────────────┐
//!                  ▼                                               ▼
//!   ┌──────────────────────────────┐             ┌──────────────────────────────────┐
//!   │      ManualCache<K, V>       │             │      LoadingCache<K, V, E>       │
//!   │                              │             │                                  │
//!   │  get(&K) → Option<Arc<V>>    │             │  get(&K) → Result<Arc<V>, _>     │
//!   │  get_or_compute(K, f)        │             │  get_all(iter)                   │
//!   │  try_get_or_compute(K, f)    │             │  refresh(&K)                     │
//!   └──────────────────────────────┘             └──────────────────────────────────┘
//! ```
//!
//! All methods take `&self`: both variants are internally synchronized and
//! cheap to clone, so a handle can be moved into every worker thread.
//!
//! Values are handed out as `Arc<V>`. A caller's handle stays valid after the
//! entry is evicted or invalidated.

use std::sync::Arc;

use crate::config::{CacheConfiguration, MemoryPressure};
use crate::stats::CacheStats;

/// Operations every cache supports, regardless of how misses are handled.
///
/// # Example
///
/// ```
/// use cachewright::prelude::*;
///
/// fn warm<C: Cache<u64, String>>(cache: &C, data: &[(u64, &str)]) {
///     cache.put_all(data.iter().map(|(k, v)| (*k, v.to_string())));
/// }
///
/// let cache = CacheBuilder::<u64, String>::new().build().unwrap();
/// warm(&cache, &[(1, "one"), (2, "two")]);
/// assert_eq!(cache.len(), 2);
/// assert_eq!(cache.get_if_present(&2).as_deref().map(String::as_str), Some("two"));
/// ```
pub trait Cache<K, V> {
    /// Returns the value for `key` if one is cached, without loading it.
    ///
    /// Counts a hit or miss and promotes the entry on a hit.
    fn get_if_present(&self, key: &K) -> Option<Arc<V>>;

    /// Inserts or overwrites `key`, then enforces the eviction bound.
    ///
    /// Returns the value that was replaced, if any.
    fn put(&self, key: K, value: V) -> Option<Arc<V>>;

    fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        Self: Sized,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Removes `key`. Idempotent; never counted as an eviction.
    fn invalidate(&self, key: &K) -> Option<Arc<V>>;

    fn invalidate_all_keys<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
        Self: Sized,
    {
        for key in keys {
            self.invalidate(key);
        }
    }

    /// Removes every entry.
    fn invalidate_all(&self);

    /// Whether a live entry exists. Does not count a request or promote.
    fn contains_key(&self, key: &K) -> bool;

    /// Number of entries, including expired ones not yet swept.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of entry weights; equals [`len`](Self::len) without a weigher.
    fn weighted_size(&self) -> u64;

    /// Snapshot of the counters. All zero unless stats were enabled.
    fn stats(&self) -> CacheStats;

    /// Removes expired entries now instead of on their next read.
    ///
    /// Returns how many entries were removed.
    fn clean_up(&self) -> usize;

    /// Runs one reference-based reclamation pass.
    ///
    /// A no-op for caches built without `weak_keys` or `soft_values`. Returns
    /// how many entries were reclaimed.
    fn reclaim(&self, pressure: MemoryPressure) -> usize;

    fn configuration(&self) -> &CacheConfiguration<K, V>;
}

/// Marker for cache handles that may be shared across threads.
pub trait ConcurrentCache: Send + Sync {}
