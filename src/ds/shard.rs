//! Deterministic key-to-shard mapping.
//!
//! Used by the single-flight table to spread in-flight loads over several
//! independently locked maps, so registering a load for one key does not
//! contend with loads for unrelated keys.
//!
//! ```text
//!   key ──► FxHasher(seed, key) ──► hash % shards ──► [ 0 | 1 | 2 | 3 ]
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Maps any `Hash` key to an index in `[0, shards)`.
///
/// The same `(key, seed, shards)` always yields the same index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
    seed: u64,
}

impl ShardSelector {
    /// Creates a selector for `shards` shards; the count is clamped to at least 1.
    pub fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: shards.max(1),
            seed,
        }
    }

    /// One shard per available core, rounded up to a power of two.
    pub fn for_parallelism(seed: u64) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cores.next_power_of_two(), seed)
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    pub fn shard_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_selector_is_deterministic() {
        let selector = ShardSelector::new(8, 123);

        let a = selector.shard_for_key(&"key");
        let b = selector.shard_for_key(&"key");
        assert_eq!(a, b);
        assert!(a < selector.shard_count());
    }

    #[test]
    fn zero_shards_clamped() {
        let selector = ShardSelector::new(0, 0);
        assert_eq!(selector.shard_count(), 1);
        assert_eq!(selector.shard_for_key(&42u64), 0);
    }

    #[test]
    fn parallelism_is_power_of_two() {
        let selector = ShardSelector::for_parallelism(7);
        assert!(selector.shard_count().is_power_of_two());
    }

    #[test]
    fn keys_spread_over_shards() {
        let selector = ShardSelector::new(4, 0);
        let mut used = [false; 4];
        for key in 0u64..256 {
            used[selector.shard_for_key(&key)] = true;
        }
        assert!(used.iter().all(|u| *u));
    }
}
