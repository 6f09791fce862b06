//! Cache statistics.
//!
//! Counters are plain relaxed atomics: readers of a [`CacheStats`] snapshot
//! see every counter at some recent value, but a snapshot is not a
//! linearizable cut across all counters.
//!
//! ```
//! use cachewright::prelude::*;
//!
//! let cache = CacheBuilder::<u32, &str>::new().record_stats().unwrap().build().unwrap();
//! assert!(cache.get(&1).is_none());
//! cache.put(1, "one");
//! assert!(cache.get(&1).is_some());
//!
//! let stats = cache.stats();
//! assert_eq!((stats.hit_count, stats.miss_count), (1, 1));
//! assert_eq!(stats.hit_rate(), 0.5);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters owned by a cache.
///
/// Every `record_*` method is a no-op when the counter was created disabled.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    total_load_nanos: AtomicU64,
    evictions: AtomicU64,
    eviction_weight: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[inline]
    fn add(&self, counter: &AtomicU64, n: u64) {
        if self.enabled {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_hit(&self) {
        self.add(&self.hits, 1);
    }

    pub(crate) fn record_miss(&self) {
        self.add(&self.misses, 1);
    }

    pub(crate) fn record_load_success(&self, elapsed: Duration) {
        self.add(&self.load_successes, 1);
        self.add(&self.total_load_nanos, saturating_nanos(elapsed));
    }

    pub(crate) fn record_load_failure(&self, elapsed: Duration) {
        self.add(&self.load_failures, 1);
        self.add(&self.total_load_nanos, saturating_nanos(elapsed));
    }

    pub(crate) fn record_eviction(&self, weight: u64) {
        self.add(&self.evictions, 1);
        self.add(&self.eviction_weight, weight);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_success_count: self.load_successes.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
            total_load_time: Duration::from_nanos(self.total_load_nanos.load(Ordering::Relaxed)),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Read-only snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub load_success_count: u64,
    pub load_failure_count: u64,
    pub total_load_time: Duration,
    pub eviction_count: u64,
    pub eviction_weight: u64,
}

impl CacheStats {
    /// Hits plus misses.
    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    /// Loader invocations, successful or not.
    pub fn load_count(&self) -> u64 {
        self.load_success_count.saturating_add(self.load_failure_count)
    }

    /// Ratio of hits to requests; `1.0` when there were no requests.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            n => self.hit_count as f64 / n as f64,
        }
    }

    /// Ratio of misses to requests; `0.0` when there were no requests.
    pub fn miss_rate(&self) -> f64 {
        match self.request_count() {
            0 => 0.0,
            n => self.miss_count as f64 / n as f64,
        }
    }

    pub fn load_failure_rate(&self) -> f64 {
        match self.load_count() {
            0 => 0.0,
            n => self.load_failure_count as f64 / n as f64,
        }
    }

    /// Mean time spent in the loader per invocation.
    pub fn average_load_penalty(&self) -> Duration {
        match self.load_count() {
            0 => Duration::ZERO,
            n => self.total_load_time / u32::try_from(n).unwrap_or(u32::MAX),
        }
    }

    /// Counter deltas since `earlier`, floored at zero.
    pub fn minus(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.saturating_sub(earlier.hit_count),
            miss_count: self.miss_count.saturating_sub(earlier.miss_count),
            load_success_count: self
                .load_success_count
                .saturating_sub(earlier.load_success_count),
            load_failure_count: self
                .load_failure_count
                .saturating_sub(earlier.load_failure_count),
            total_load_time: self.total_load_time.saturating_sub(earlier.total_load_time),
            eviction_count: self.eviction_count.saturating_sub(earlier.eviction_count),
            eviction_weight: self.eviction_weight.saturating_sub(earlier.eviction_weight),
        }
    }

    /// Sum of two snapshots, e.g. across several caches.
    pub fn plus(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.saturating_add(other.hit_count),
            miss_count: self.miss_count.saturating_add(other.miss_count),
            load_success_count: self
                .load_success_count
                .saturating_add(other.load_success_count),
            load_failure_count: self
                .load_failure_count
                .saturating_add(other.load_failure_count),
            total_load_time: self.total_load_time.saturating_add(other.total_load_time),
            eviction_count: self.eviction_count.saturating_add(other.eviction_count),
            eviction_weight: self.eviction_weight.saturating_add(other.eviction_weight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counter_stays_zero() {
        let counter = StatsCounter::new(false);
        counter.record_hit();
        counter.record_miss();
        counter.record_eviction(3);
        counter.record_load_success(Duration::from_millis(5));
        assert_eq!(counter.snapshot(), CacheStats::default());
    }

    #[test]
    fn enabled_counter_tracks_each_event() {
        let counter = StatsCounter::new(true);
        counter.record_hit();
        counter.record_hit();
        counter.record_miss();
        counter.record_eviction(4);
        counter.record_load_success(Duration::from_millis(3));
        counter.record_load_failure(Duration::from_millis(1));

        let stats = counter.snapshot();
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.eviction_count, 1);
        assert_eq!(stats.eviction_weight, 4);
        assert_eq!(stats.load_count(), 2);
        assert_eq!(stats.total_load_time, Duration::from_millis(4));
        assert_eq!(stats.average_load_penalty(), Duration::from_millis(2));
        assert_eq!(stats.load_failure_rate(), 0.5);
    }

    #[test]
    fn rates_with_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 1.0);
        assert_eq!(stats.miss_rate(), 0.0);
        assert_eq!(stats.average_load_penalty(), Duration::ZERO);
    }

    #[test]
    fn minus_and_plus() {
        let a = CacheStats {
            hit_count: 5,
            miss_count: 2,
            eviction_count: 1,
            ..CacheStats::default()
        };
        let b = CacheStats {
            hit_count: 8,
            miss_count: 2,
            eviction_count: 4,
            ..CacheStats::default()
        };
        let delta = b.minus(&a);
        assert_eq!((delta.hit_count, delta.miss_count, delta.eviction_count), (3, 0, 3));
        assert_eq!(a.minus(&b).hit_count, 0);
        assert_eq!(a.plus(&b).hit_count, 13);
    }
}
