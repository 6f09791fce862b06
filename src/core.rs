//! Shared storage and eviction engine behind both cache variants.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          CacheCore<K, V>                             │
//!   │                                                                      │
//!   │   config: CacheConfiguration<K, V>      stats: StatsCounter          │
//!   │                                                                      │
//!   │   ┌──────────────────────── RwLock<CoreState> ─────────────────────┐ │
//!   │   │                                                                │ │
//!   │   │   index: FxHashMap<K, SlotId>                                  │ │
//!   │   │              │                                                 │ │
//!   │   │              ▼                                                 │ │
//!   │   │   order: RecencyList<CacheEntry<K, V>>                         │ │
//!   │   │     head (MRU) ─► [e4] ◄──► [e1] ◄──► [e7] ◄── tail (LRU)      │ │
//!   │   │                                                                │ │
//!   │   │   weighted_size: Σ entry.weight                                │ │
//!   │   └────────────────────────────────────────────────────────────────┘ │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every read that hits promotes the entry to the head, so it needs the write
//! lock; `peek`, `contains_key` and size queries take the read lock.
//!
//! ## Eviction
//!
//! Runs under the write lock of the mutation that triggered it. While the
//! bound is exceeded the tail entry is removed. The entry just written is never
//! chosen unless the bound is `0`, in which case every entry goes. Entries that
//! were never promoted leave in insertion order.
//!
//! ## Reclamation
//!
//! A reclamation pass stands in for a tracing collector clearing weak and soft
//! references:
//!
//! - weak keys: an entry is reclaimed when no caller holds its value (`Arc`
//!   strong count of one) and it was neither read nor written since the
//!   previous pass.
//! - soft values: under pressure, entries are reclaimed least recently used
//!   first, whether or not a caller holds the value, until the weighted size
//!   reaches the pressure target.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::{CacheConfiguration, EvictionPolicy, MemoryPressure};
use crate::ds::recency_list::RecencyList;
use crate::ds::slot_arena::SlotId;
use crate::stats::{CacheStats, StatsCounter};

#[derive(Debug)]
pub(crate) struct CacheEntry<K, V> {
    key: K,
    value: Arc<V>,
    weight: u64,
    written_at: Instant,
    accessed_at: Instant,
    referenced: bool,
}

#[derive(Debug)]
struct CoreState<K, V> {
    index: FxHashMap<K, SlotId>,
    order: RecencyList<CacheEntry<K, V>>,
    /// Exact sum of entry weights. Wider than a single weight so that any
    /// number of `u64` weights adds up without wrapping.
    weighted_size: u128,
}

impl<K, V> CoreState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn unlink(&mut self, id: SlotId) -> Option<CacheEntry<K, V>> {
        let entry = self.order.remove(id)?;
        self.index.remove(&entry.key);
        self.weighted_size = self.weighted_size.saturating_sub(u128::from(entry.weight));
        Some(entry)
    }

    /// Weighted size as reported to callers, saturating at `u64::MAX`.
    fn reported_weight(&self) -> u64 {
        u64::try_from(self.weighted_size).unwrap_or(u64::MAX)
    }

    fn unlink_key(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        let id = *self.index.get(key)?;
        self.unlink(id)
    }

    #[cfg(any(test, debug_assertions))]
    fn debug_validate_invariants(&self) {
        self.order.debug_validate_invariants();
        assert_eq!(self.index.len(), self.order.len());
        let total: u128 = self.order.iter().map(|entry| u128::from(entry.weight)).sum();
        assert_eq!(total, self.weighted_size);
        for (key, id) in &self.index {
            let entry = self.order.get(*id).expect("index points at a live entry");
            assert!(entry.key == *key);
        }
    }
}

/// Map, recency order, weights and counters of one cache instance.
pub(crate) struct CacheCore<K, V> {
    state: RwLock<CoreState<K, V>>,
    config: CacheConfiguration<K, V>,
    stats: StatsCounter,
}

impl<K, V> CacheCore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(config: CacheConfiguration<K, V>) -> Self {
        let capacity = config.initial_capacity;
        Self {
            state: RwLock::new(CoreState {
                index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                order: RecencyList::with_capacity(capacity),
                weighted_size: 0,
            }),
            stats: StatsCounter::new(config.stats_enabled),
            config,
        }
    }

    pub(crate) fn config(&self) -> &CacheConfiguration<K, V> {
        &self.config
    }

    pub(crate) fn stats_counter(&self) -> &StatsCounter {
        &self.stats
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Looks up `key`, promoting it on a hit. Counts a hit or miss when
    /// `record` is set.
    pub(crate) fn get(&self, key: &K, record: bool) -> Option<Arc<V>> {
        let now = Instant::now();
        let mut state = self.state.write();
        let found = match state.index.get(key).copied() {
            Some(id) => self.touch(&mut state, id, now),
            None => None,
        };
        drop(state);

        if record {
            match found {
                Some(_) => self.stats.record_hit(),
                None => self.stats.record_miss(),
            }
        }
        found
    }

    /// Reads `key` without promoting it or counting a request.
    pub(crate) fn peek(&self, key: &K) -> Option<Arc<V>> {
        let now = Instant::now();
        let state = self.state.read();
        let id = state.index.get(key)?;
        let entry = state.order.get(*id)?;
        if self.is_expired(entry, now) {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Inserts or overwrites `key`, then enforces the bound. Returns the
    /// previous value.
    pub(crate) fn insert(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        self.insert_with(key, value, || {})
    }

    /// Same as [`insert`](Self::insert), running `also` while the write lock
    /// is still held.
    pub(crate) fn insert_with(&self, key: K, value: Arc<V>, also: impl FnOnce()) -> Option<Arc<V>> {
        let mut state = self.state.write();
        let previous = self.insert_locked(&mut state, key, value);
        also();
        previous
    }

    /// Inserts `value` only if `key` has no live entry; returns whichever value
    /// the cache holds afterwards.
    pub(crate) fn insert_if_absent(&self, key: K, value: Arc<V>) -> Arc<V> {
        let now = Instant::now();
        let mut state = self.state.write();
        if let Some(id) = state.index.get(&key).copied() {
            if let Some(existing) = self.touch(&mut state, id, now) {
                return existing;
            }
        }
        self.insert_locked(&mut state, key, Arc::clone(&value));
        value
    }

    /// Inserts under the write lock only if `admit` agrees once the lock is
    /// held. Returns whether the value was stored.
    pub(crate) fn insert_when(&self, key: K, value: Arc<V>, admit: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.write();
        if !admit() {
            return false;
        }
        self.insert_locked(&mut state, key, value);
        true
    }

    /// Removes `key`, running `also` while the write lock is still held.
    pub(crate) fn remove_with(&self, key: &K, also: impl FnOnce()) -> Option<Arc<V>> {
        let mut state = self.state.write();
        let removed = state.unlink_key(key);
        also();
        drop(state);
        removed.map(|entry| entry.value)
    }

    pub(crate) fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.remove_with(key, || {})
    }

    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        state.index.clear();
        state.order.clear();
        state.weighted_size = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub(crate) fn weighted_size(&self) -> u64 {
        self.state.read().reported_weight()
    }

    /// Removes every expired entry; returns how many were removed.
    pub(crate) fn clean_up(&self) -> usize {
        if !self.config.expiration.is_enabled() {
            return 0;
        }
        let now = Instant::now();
        let mut state = self.state.write();
        let expired: Vec<SlotId> = state
            .order
            .iter_ids_lru()
            .filter(|id| {
                state
                    .order
                    .get(*id)
                    .is_some_and(|entry| self.is_expired(entry, now))
            })
            .collect();
        for id in &expired {
            self.evict(&mut state, *id, "expired");
        }
        expired.len()
    }

    /// One reclamation pass for weak keys and soft values; returns how many
    /// entries were reclaimed.
    pub(crate) fn reclaim(&self, pressure: MemoryPressure) -> usize {
        let retention = self.config.retention;
        if retention.is_strong() {
            return 0;
        }

        let mut state = self.state.write();
        let mut reclaimed = 0;

        if retention.weak_keys {
            let ids: Vec<SlotId> = state.order.iter_ids_lru().collect();
            for id in ids {
                let Some(entry) = state.order.get_mut(id) else {
                    continue;
                };
                if entry.referenced {
                    entry.referenced = false;
                } else if Arc::strong_count(&entry.value) == 1 {
                    self.evict(&mut state, id, "weak-key");
                    reclaimed += 1;
                }
            }
        }

        if retention.soft_values {
            if let Some(target) = pressure.soft_target(state.reported_weight()) {
                let target_weight = u128::from(target);
                while state.weighted_size > target_weight
                    || (target == 0 && !state.order.is_empty())
                {
                    let Some(victim) = state.order.back_id() else {
                        break;
                    };
                    self.evict(&mut state, victim, "soft-value");
                    reclaimed += 1;
                }
            }
        }

        trace!(reclaimed, ?pressure, "reclamation pass");
        reclaimed
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_validate_invariants(&self) {
        self.state.read().debug_validate_invariants();
    }

    fn is_expired(&self, entry: &CacheEntry<K, V>, now: Instant) -> bool {
        self.config
            .expiration
            .is_expired(entry.written_at, entry.accessed_at, now)
    }

    /// Promotes a live entry and returns its value; an expired entry is
    /// evicted instead.
    fn touch(&self, state: &mut CoreState<K, V>, id: SlotId, now: Instant) -> Option<Arc<V>> {
        let expired = self.is_expired(state.order.get(id)?, now);
        if expired {
            self.evict(state, id, "expired");
            return None;
        }
        let entry = state.order.get_mut(id)?;
        entry.accessed_at = now;
        entry.referenced = true;
        let value = Arc::clone(&entry.value);
        state.order.move_to_front(id);
        Some(value)
    }

    fn insert_locked(
        &self,
        state: &mut CoreState<K, V>,
        key: K,
        value: Arc<V>,
    ) -> Option<Arc<V>> {
        let now = Instant::now();
        let weight = self.config.eviction.weigh(&key, &value);

        let (id, previous) = match state.index.get(&key).copied() {
            Some(id) => {
                let previous = state.order.get_mut(id).map(|entry| {
                    let old_weight = std::mem::replace(&mut entry.weight, weight);
                    entry.written_at = now;
                    entry.accessed_at = now;
                    entry.referenced = true;
                    (old_weight, std::mem::replace(&mut entry.value, value))
                });
                let Some((old_weight, previous)) = previous else {
                    return None;
                };
                state.weighted_size =
                    state.weighted_size.saturating_sub(u128::from(old_weight)) + u128::from(weight);
                state.order.move_to_front(id);
                (id, Some(previous))
            },
            None => {
                let id = state.order.push_front(CacheEntry {
                    key: key.clone(),
                    value,
                    weight,
                    written_at: now,
                    accessed_at: now,
                    referenced: true,
                });
                state.index.insert(key, id);
                state.weighted_size += u128::from(weight);
                (id, None)
            },
        };

        self.enforce_bound(state, id);

        #[cfg(debug_assertions)]
        state.debug_validate_invariants();

        previous
    }

    fn enforce_bound(&self, state: &mut CoreState<K, V>, just_written: SlotId) {
        let Some(limit) = self.config.eviction.limit() else {
            return;
        };

        if limit == 0 {
            while let Some(victim) = state.order.back_id() {
                self.evict(state, victim, "bound");
            }
            return;
        }

        loop {
            let over = match &self.config.eviction {
                EvictionPolicy::Unbounded => false,
                EvictionPolicy::MaxEntries(n) => state.order.len() as u64 > *n,
                EvictionPolicy::MaxWeight { limit, .. } => {
                    state.weighted_size > u128::from(*limit)
                },
            };
            if !over {
                break;
            }
            match state.order.back_id() {
                Some(victim) if victim != just_written => self.evict(state, victim, "bound"),
                _ => break,
            }
        }
    }

    fn evict(&self, state: &mut CoreState<K, V>, id: SlotId, cause: &'static str) {
        if let Some(entry) = state.unlink(id) {
            self.stats.record_eviction(entry.weight);
            trace!(
                cause,
                weight = entry.weight,
                policy = self.config.eviction.as_str(),
                "evicted cache entry"
            );
        }
    }
}
