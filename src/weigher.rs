//! Entry weighers for weight-bounded caches.
//!
//! A weigher assigns a non-negative cost to each entry. A cache built with
//! [`maximum_weight`](crate::builder::CacheBuilder::maximum_weight) keeps the
//! sum of these costs at or below its bound. Caches bounded by entry count,
//! or unbounded, weigh every entry as `1` ([`UnitWeigher`]).
//!
//! Weights are computed once, when an entry is written, and cached with the
//! entry. A weigher must therefore be pure: the same key and value must always
//! weigh the same.
//!
//! ## Example
//!
//! ```
//! use cachewright::weigher::{FnWeigher, Weigher};
//!
//! let by_len = FnWeigher::new(|_key: &u32, value: &String| value.len() as u64);
//! assert_eq!(by_len.weigh(&1, &"abcd".to_string()), 4);
//! ```

use std::fmt;

/// Computes the cost of a cache entry.
pub trait Weigher<K, V>: Send + Sync {
    /// Returns the weight of `key`/`value`. Zero is a legal weight.
    fn weigh(&self, key: &K, value: &V) -> u64;
}

/// Every entry costs exactly one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitWeigher;

impl<K, V> Weigher<K, V> for UnitWeigher {
    #[inline]
    fn weigh(&self, _key: &K, _value: &V) -> u64 {
        1
    }
}

/// A weigher backed by a closure.
#[derive(Clone, Copy)]
pub struct FnWeigher<F>(F);

impl<F> FnWeigher<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for FnWeigher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnWeigher(..)")
    }
}

impl<K, V, F> Weigher<K, V> for FnWeigher<F>
where
    F: Fn(&K, &V) -> u64 + Send + Sync + 'static,
{
    #[inline]
    fn weigh(&self, key: &K, value: &V) -> u64 {
        (self.0)(key, value)
    }
}
