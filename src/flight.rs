//! Single-flight bookkeeping for computing loads.
//!
//! ## Architecture
//!
//! ```text
//!   FlightTable<K, V, E>
//!   ┌──────────────────────┬──────────────────────┬─────┐
//!   │ Mutex<Map<K,Flight>> │ Mutex<Map<K,Flight>> │ ... │   ShardSelector picks
//!   └──────────┬───────────┴──────────────────────┴─────┘   the shard for a key
//!              │
//!              ▼
//!   Flight { outcome: Mutex<Option<Result>>, ready: Condvar, superseded }
//!        ▲             ▲             ▲
//!     leader       follower      follower        (all receive one outcome)
//! ```
//!
//! A key has at most one registered flight. The first caller to find none
//! becomes the leader and runs the loader; later callers block on the flight's
//! condvar until the leader completes it.
//!
//! A flight is *superseded* when the key is invalidated or overwritten while
//! the load runs. The leader then keeps its value out of the cache, and
//! callers that arrive after the supersede wait for the flight to finish and
//! start a fresh load instead of joining it.
//!
//! ## Lock order
//!
//! shard lock → cache state lock. The leader never holds both: it publishes
//! under the state lock, then removes its flight under the shard lock, then
//! wakes the followers.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::ds::shard::ShardSelector;
use crate::error::LoadError;

pub(crate) type LoadResult<V, E> = Result<Arc<V>, LoadError<E>>;

/// One in-flight load.
pub(crate) struct Flight<V, E> {
    outcome: Mutex<Option<LoadResult<V, E>>>,
    ready: Condvar,
    superseded: AtomicBool,
}

impl<V, E> Flight<V, E> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
            superseded: AtomicBool::new(false),
        })
    }

    /// Blocks until the leader completes the flight.
    pub(crate) fn wait(&self) -> LoadResult<V, E> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }

    pub(crate) fn supersede(&self) {
        self.superseded.store(true, Ordering::Release);
    }

    pub(crate) fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    fn complete(&self, result: LoadResult<V, E>) {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(result);
        }
        drop(outcome);
        self.ready.notify_all();
    }
}

/// Outcome of trying to register interest in a key's load.
pub(crate) enum Claim<'a, K, V, E>
where
    K: Eq + Hash + Clone,
{
    /// The value showed up while the shard was locked.
    Hit(Arc<V>),
    /// The caller must run the loader and complete the flight.
    Leader(LeaderGuard<'a, K, V, E>),
    /// Another caller is loading; wait for its outcome.
    Follower(Arc<Flight<V, E>>),
    /// The registered load was superseded; wait for it, then retry.
    Superseded(Arc<Flight<V, E>>),
}

type Shard<K, V, E> = Mutex<FxHashMap<K, Arc<Flight<V, E>>>>;

/// Sharded map of in-flight loads, keyed by cache key.
pub(crate) struct FlightTable<K, V, E> {
    shards: Box<[Shard<K, V, E>]>,
    selector: ShardSelector,
}

impl<K, V, E> FlightTable<K, V, E>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(selector: ShardSelector) -> Self {
        let shards = (0..selector.shard_count())
            .map(|_| Mutex::new(FxHashMap::default()))
            .collect();
        Self { shards, selector }
    }

    fn shard(&self, key: &K) -> &Shard<K, V, E> {
        &self.shards[self.selector.shard_for_key(key)]
    }

    /// Joins the key's flight or registers a new one.
    ///
    /// `recheck` runs under the shard lock when no flight is registered, so a
    /// value published by a leader that finished in the meantime is found
    /// instead of being loaded a second time.
    pub(crate) fn claim<'a>(
        &'a self,
        key: &'a K,
        recheck: impl FnOnce() -> Option<Arc<V>>,
    ) -> Claim<'a, K, V, E> {
        let mut flights = self.shard(key).lock();
        if let Some(flight) = flights.get(key) {
            return if flight.is_superseded() {
                Claim::Superseded(Arc::clone(flight))
            } else {
                Claim::Follower(Arc::clone(flight))
            };
        }
        if let Some(value) = recheck() {
            return Claim::Hit(value);
        }
        let flight = Flight::new();
        flights.insert(key.clone(), Arc::clone(&flight));
        Claim::Leader(LeaderGuard {
            table: self,
            key,
            flight,
            completed: false,
        })
    }

    /// Runs `f` with the key's registered flight, holding the shard lock.
    pub(crate) fn with_flight<R>(&self, key: &K, f: impl FnOnce(Option<&Flight<V, E>>) -> R) -> R {
        let flights = self.shard(key).lock();
        f(flights.get(key).map(Arc::as_ref))
    }

    /// Runs `f` once per registered flight, shard by shard.
    pub(crate) fn for_each_flight(&self, mut f: impl FnMut(&Flight<V, E>)) {
        for shard in self.shards.iter() {
            for flight in shard.lock().values() {
                f(flight);
            }
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn finish(&self, key: &K, flight: &Arc<Flight<V, E>>) {
        let mut flights = self.shard(key).lock();
        if flights
            .get(key)
            .is_some_and(|registered| Arc::ptr_eq(registered, flight))
        {
            flights.remove(key);
        }
    }
}

/// Held by the caller running the loader.
///
/// Dropping the guard without calling [`complete`](Self::complete), e.g. when
/// the loader panics, fails the flight with [`LoadError::Panicked`] so that
/// followers never block forever.
pub(crate) struct LeaderGuard<'a, K, V, E>
where
    K: Eq + Hash + Clone,
{
    table: &'a FlightTable<K, V, E>,
    key: &'a K,
    flight: Arc<Flight<V, E>>,
    completed: bool,
}

impl<K, V, E> LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn flight(&self) -> &Flight<V, E> {
        &self.flight
    }

    /// Unregisters the flight and hands `result` to every follower.
    pub(crate) fn complete(mut self, result: LoadResult<V, E>) {
        self.completed = true;
        self.table.finish(self.key, &self.flight);
        self.flight.complete(result);
    }
}

impl<K, V, E> Drop for LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if !self.completed {
            warn!("cache loader panicked; failing waiters");
            self.table.finish(self.key, &self.flight);
            self.flight.complete(Err(LoadError::Panicked));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    type Table = FlightTable<u32, String, &'static str>;

    fn table() -> Table {
        FlightTable::new(ShardSelector::new(4, 0))
    }

    #[test]
    fn first_claim_leads_and_later_claims_follow() {
        let table = table();
        let key = 1;
        let Claim::Leader(leader) = table.claim(&key, || None) else {
            panic!("first claim must lead");
        };
        let Claim::Follower(follower) = table.claim(&key, || None) else {
            panic!("second claim must follow");
        };
        assert_eq!(table.in_flight(), 1);

        leader.complete(Ok(Arc::new("v".to_string())));
        assert_eq!(table.in_flight(), 0);
        assert_eq!(follower.wait().ok().as_deref().map(String::as_str), Some("v"));
    }

    #[test]
    fn recheck_hit_skips_registration() {
        let table = table();
        let key = 7;
        let claim = table.claim(&key, || Some(Arc::new("cached".to_string())));
        assert!(matches!(claim, Claim::Hit(_)));
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn superseded_flight_is_not_joined() {
        let table = table();
        let key = 3;
        let Claim::Leader(leader) = table.claim(&key, || None) else {
            panic!("first claim must lead");
        };
        table.with_flight(&key, |flight| flight.map(Flight::supersede));
        assert!(leader.flight().is_superseded());
        assert!(matches!(table.claim(&key, || None), Claim::Superseded(_)));
        leader.complete(Err(LoadError::Failed(Arc::new("stale"))));
        assert!(matches!(table.claim(&key, || None), Claim::Leader(_)));
    }

    #[test]
    fn dropped_leader_fails_followers() {
        let table = Arc::new(table());
        let key = 9;
        let follower = {
            let Claim::Leader(leader) = table.claim(&key, || None) else {
                panic!("first claim must lead");
            };
            let Claim::Follower(follower) = table.claim(&key, || None) else {
                panic!("second claim must follow");
            };
            drop(leader);
            follower
        };
        assert!(matches!(follower.wait(), Err(LoadError::Panicked)));
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn followers_block_until_completion() {
        let table = table();
        let key = 5;
        let Claim::Leader(leader) = table.claim(&key, || None) else {
            panic!("first claim must lead");
        };
        let flights: Vec<_> = (0..4)
            .map(|_| match table.claim(&key, || None) {
                Claim::Follower(flight) => flight,
                _ => panic!("later claims must follow"),
            })
            .collect();

        let waiters: Vec<_> = flights
            .into_iter()
            .map(|flight| thread::spawn(move || flight.wait()))
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(waiters.iter().all(|waiter| !waiter.is_finished()));
        leader.complete(Ok(Arc::new("done".to_string())));

        for waiter in waiters {
            let value = waiter.join().unwrap().ok();
            assert_eq!(value.as_deref().map(String::as_str), Some("done"));
        }
    }
}
