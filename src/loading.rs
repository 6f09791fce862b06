//! Cache that computes missing values with a loader, one load per key at a time.
//!
//! ## Key states
//!
//! ```text
//!              get (miss)               loader Ok
//!   Absent ──────────────► Pending ─────────────────► Present
//!     ▲                      │                          │
//!     │     loader Err /     │                          │ invalidate / evict
//!     └──── panic ───────────┘                          │
//!     ▲                                                 │
//!     └─────────────────────────────────────────────────┘
//! ```
//!
//! While a key is pending, every other `get` for it blocks on the same flight
//! and receives the same outcome. A failure is shared by all waiters and is not
//! cached: the key returns to absent and the next `get` runs the loader again.
//!
//! `invalidate` or `put` on a pending key does not cancel the load. It marks
//! the flight superseded, and the loaded value is handed to the callers already
//! waiting but never stored.
//!
//! ## Example
//!
//! ```
//! use cachewright::prelude::*;
//!
//! let cache = CacheBuilder::<u32, String>::new()
//!     .maximum_size(100)
//!     .unwrap()
//!     .build_with_loader(|key: &u32| Ok::<_, std::num::TryFromIntError>(format!("user-{key}")))
//!     .unwrap();
//!
//! assert_eq!(cache.get(&7).unwrap().as_str(), "user-7");
//! assert!(cache.contains_key(&7));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::{CacheConfiguration, MemoryPressure};
use crate::core::CacheCore;
use crate::ds::shard::ShardSelector;
use crate::error::LoadError;
use crate::flight::{Claim, FlightTable, LeaderGuard};
use crate::stats::{CacheStats, StatsCounter};
use crate::traits::{Cache, ConcurrentCache};

/// Shared loader signature.
pub type Loader<K, V, E> = dyn Fn(&K) -> Result<V, E> + Send + Sync;

struct LoadingInner<K, V, E> {
    core: CacheCore<K, V>,
    flights: FlightTable<K, V, E>,
    loader: Box<Loader<K, V, E>>,
}

/// Thread-safe cache that loads missing values on demand.
///
/// Cloning is cheap and yields another handle to the same storage and
/// in-flight loads.
pub struct LoadingCache<K, V, E> {
    inner: Arc<LoadingInner<K, V, E>>,
}

impl<K, V, E> LoadingCache<K, V, E>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(config: CacheConfiguration<K, V>, loader: Box<Loader<K, V, E>>) -> Self {
        Self {
            inner: Arc::new(LoadingInner {
                core: CacheCore::new(config),
                flights: FlightTable::new(ShardSelector::for_parallelism(0)),
                loader,
            }),
        }
    }

    /// Returns the cached value for `key`, loading it on a miss.
    ///
    /// Concurrent calls for the same missing key run the loader once and all
    /// receive its outcome. Blocks for as long as the loader runs.
    ///
    /// Counts one hit or miss per call. A call that misses and then finds the
    /// value published by a load that finished in the meantime counts as a
    /// miss without a load of its own.
    pub fn get(&self, key: &K) -> Result<Arc<V>, LoadError<E>> {
        let inner = &*self.inner;
        let mut first_attempt = true;
        loop {
            if let Some(value) = inner.core.get(key, first_attempt) {
                return Ok(value);
            }
            first_attempt = false;

            match inner.flights.claim(key, || inner.core.peek(key)) {
                Claim::Hit(value) => return Ok(value),
                Claim::Follower(flight) => return flight.wait(),
                Claim::Superseded(flight) => {
                    let _ = flight.wait();
                },
                Claim::Leader(guard) => return self.load(key, guard),
            }
        }
    }

    /// Loads every key in `keys`, returning the first failure encountered.
    pub fn get_all<'a, I>(&self, keys: I) -> Result<HashMap<K, Arc<V>>, LoadError<E>>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        keys.into_iter()
            .map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Runs the loader again for `key` and swaps in the new value.
    ///
    /// Readers keep seeing the previous value until the swap. If the loader
    /// fails, the previous value stays cached and the failure is returned. A
    /// refresh of an absent key behaves like a load. A refresh that meets a
    /// load already in flight for the key joins it.
    pub fn refresh(&self, key: &K) -> Result<Arc<V>, LoadError<E>> {
        let inner = &*self.inner;
        loop {
            match inner.flights.claim(key, || None) {
                Claim::Hit(value) => return Ok(value),
                Claim::Follower(flight) => return flight.wait(),
                Claim::Superseded(flight) => {
                    let _ = flight.wait();
                },
                Claim::Leader(guard) => return self.load(key, guard),
            }
        }
    }

    /// Number of loads currently running.
    pub fn pending_loads(&self) -> usize {
        self.inner.flights.in_flight()
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.inner.core.debug_validate_invariants();
    }

    fn load(&self, key: &K, guard: LeaderGuard<'_, K, V, E>) -> Result<Arc<V>, LoadError<E>> {
        let inner = &*self.inner;
        let mut recorder = PanicRecorder {
            stats: inner.core.stats_counter(),
            started: Instant::now(),
            armed: true,
        };
        let outcome = (inner.loader)(key);
        recorder.armed = false;
        let elapsed = recorder.started.elapsed();

        let result = match outcome {
            Ok(value) => {
                inner.core.stats_counter().record_load_success(elapsed);
                let value = Arc::new(value);
                let flight = guard.flight();
                let stored = inner
                    .core
                    .insert_when(key.clone(), Arc::clone(&value), || !flight.is_superseded());
                if !stored {
                    debug!("load for invalidated key completed; value not stored");
                }
                Ok(value)
            },
            Err(err) => {
                inner.core.stats_counter().record_load_failure(elapsed);
                debug!(elapsed_us = elapsed.as_micros() as u64, "cache load failed");
                Err(LoadError::Failed(Arc::new(err)))
            },
        };
        guard.complete(result.clone());
        result
    }
}

/// Counts a loader that unwinds as a failed load.
struct PanicRecorder<'a> {
    stats: &'a StatsCounter,
    started: Instant,
    armed: bool,
}

impl Drop for PanicRecorder<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.stats.record_load_failure(self.started.elapsed());
        }
    }
}

impl<K, V, E> Cache<K, V> for LoadingCache<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
        self.inner.core.get(key, true)
    }

    /// Stores `value`; a load in flight for `key` will not overwrite it.
    fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        let inner = &*self.inner;
        inner.flights.with_flight(&key, |flight| {
            let value = Arc::new(value);
            inner.core.insert_with(key.clone(), value, || {
                if let Some(flight) = flight {
                    flight.supersede();
                }
            })
        })
    }

    /// Removes `key`; a load in flight for `key` completes for its current
    /// waiters but its value is never stored.
    fn invalidate(&self, key: &K) -> Option<Arc<V>> {
        let inner = &*self.inner;
        inner.flights.with_flight(key, |flight| {
            inner.core.remove_with(key, || {
                if let Some(flight) = flight {
                    flight.supersede();
                }
            })
        })
    }

    fn invalidate_all(&self) {
        let inner = &*self.inner;
        inner.flights.for_each_flight(|flight| flight.supersede());
        inner.core.clear();
    }

    fn contains_key(&self, key: &K) -> bool {
        self.inner.core.contains_key(key)
    }

    fn len(&self) -> usize {
        self.inner.core.len()
    }

    fn weighted_size(&self) -> u64 {
        self.inner.core.weighted_size()
    }

    fn stats(&self) -> CacheStats {
        self.inner.core.stats()
    }

    fn clean_up(&self) -> usize {
        self.inner.core.clean_up()
    }

    fn reclaim(&self, pressure: MemoryPressure) -> usize {
        self.inner.core.reclaim(pressure)
    }

    fn configuration(&self) -> &CacheConfiguration<K, V> {
        self.inner.core.config()
    }
}

impl<K, V, E> Clone for LoadingCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> fmt::Debug for LoadingCache<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("len", &self.inner.core.len())
            .field("weighted_size", &self.inner.core.weighted_size())
            .field("eviction", &self.inner.core.config().eviction().as_str())
            .field("pending_loads", &self.inner.flights.in_flight())
            .finish()
    }
}

impl<K, V, E> ConcurrentCache for LoadingCache<K, V, E>
where
    K: Send + Sync,
    V: Send + Sync,
    E: Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::builder::CacheBuilder;

    fn counting_cache(calls: Arc<AtomicUsize>) -> LoadingCache<u32, String, String> {
        CacheBuilder::new()
            .record_stats()
            .unwrap()
            .build_with_loader(move |key: &u32| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if *key == 0 {
                    Err(format!("no value for zero (call {n})"))
                } else {
                    Ok(format!("v{key}.{n}"))
                }
            })
            .unwrap()
    }

    #[test]
    fn miss_loads_and_hit_reuses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&calls));

        let first = cache.get(&1).unwrap();
        let second = cache.get(&1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.load_success_count, 1);
        assert_eq!(cache.pending_loads(), 0);
    }

    #[test]
    fn failure_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&calls));

        let err = cache.get(&0).unwrap_err();
        assert_eq!(err.loader_error().map(String::as_str), Some("no value for zero (call 0)"));
        assert!(!cache.contains_key(&0));

        let again = cache.get(&0).unwrap_err();
        assert!(!err.is_same_failure(&again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().load_failure_count, 2);
    }

    #[test]
    fn get_if_present_never_loads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&calls));
        assert!(cache.get_if_present(&5).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn get_all_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls);

        let loaded = cache.get_all(&[1, 2]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(cache.get_all(&[3, 0, 4]).is_err());
        assert!(cache.contains_key(&3));
    }

    #[test]
    fn refresh_swaps_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&calls));

        let before = cache.get(&2).unwrap();
        let after = cache.refresh(&2).unwrap();
        assert_eq!(before.as_str(), "v2.0");
        assert_eq!(after.as_str(), "v2.1");
        assert_eq!(cache.get(&2).unwrap().as_str(), "v2.1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_refresh_keeps_old_value() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let cache = CacheBuilder::<u32, u32>::new()
            .build_with_loader(move |key: &u32| {
                if flag.load(Ordering::SeqCst) {
                    Err("down")
                } else {
                    Ok(key * 10)
                }
            })
            .unwrap();

        assert_eq!(*cache.get(&4).unwrap(), 40);
        fail.store(true, Ordering::SeqCst);
        assert!(cache.refresh(&4).is_err());
        assert_eq!(cache.get_if_present(&4).as_deref(), Some(&40));
    }

    #[test]
    fn invalidate_while_pending_drops_loaded_value() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = parking_lot::Mutex::new(release_rx);
        let started_tx = parking_lot::Mutex::new(started_tx);

        let cache = CacheBuilder::<u32, u32>::new()
            .build_with_loader(move |key: &u32| {
                let _ = started_tx.lock().send(());
                let _ = release_rx.lock().recv();
                Ok::<_, String>(*key + 1)
            })
            .unwrap();

        let loader_cache = cache.clone();
        let handle = thread::spawn(move || loader_cache.get(&1));

        started_rx.recv().unwrap();
        assert_eq!(cache.pending_loads(), 1);
        assert!(cache.invalidate(&1).is_none());
        release_tx.send(()).unwrap();

        assert_eq!(*handle.join().unwrap().unwrap(), 2);
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.pending_loads(), 0);
    }

    #[test]
    fn put_while_pending_wins_over_load() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = parking_lot::Mutex::new(release_rx);
        let started_tx = parking_lot::Mutex::new(started_tx);

        let cache = CacheBuilder::<u32, u32>::new()
            .build_with_loader(move |_: &u32| {
                let _ = started_tx.lock().send(());
                let _ = release_rx.lock().recv();
                Ok::<_, String>(100)
            })
            .unwrap();

        let loader_cache = cache.clone();
        let handle = thread::spawn(move || loader_cache.get(&1));

        started_rx.recv().unwrap();
        cache.put(1, 7);
        release_tx.send(()).unwrap();

        assert_eq!(*handle.join().unwrap().unwrap(), 100);
        assert_eq!(cache.get_if_present(&1).as_deref(), Some(&7));
    }

    #[test]
    fn loader_panic_fails_waiters_and_recovers() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = parking_lot::Mutex::new(started_tx);
        let release_rx = parking_lot::Mutex::new(release_rx);
        let calls = AtomicUsize::new(0);
        let cache = CacheBuilder::<u32, u32>::new()
            .record_stats()
            .unwrap()
            .build_with_loader(move |key: &u32| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = started_tx.lock().send(());
                    let _ = release_rx.lock().recv();
                    panic!("loader blew up");
                }
                Ok::<_, String>(*key)
            })
            .unwrap();

        let leader = {
            let cache = cache.clone();
            thread::spawn(move || cache.get(&3))
        };
        started_rx.recv().unwrap();
        let Claim::Follower(follower) = cache.inner.flights.claim(&3, || None) else {
            panic!("a load is registered for the key");
        };
        release_tx.send(()).unwrap();

        assert!(leader.join().is_err());
        assert!(matches!(follower.wait(), Err(LoadError::Panicked)));
        assert_eq!(cache.pending_loads(), 0);
        assert_eq!(cache.stats().load_failure_count, 1);

        assert_eq!(*cache.get(&3).unwrap(), 3);
        assert_eq!(cache.stats().load_count(), 2);
    }
}
