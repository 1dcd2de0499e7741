//! Keyed record cache with stale-while-revalidate semantics
//!
//! Each key owns one slot holding the last good value, its fetch time, a
//! stale flag and an optional in-flight load. Concurrent fetches of the same
//! key coalesce onto a single load whose result is broadcast to every
//! waiter; this prevents duplicate requests when several views ask for the
//! same collection in the same tick.
//!
//! Every load and every invalidation bumps the slot's generation. A load
//! only writes back if it is still the slot's current in-flight load, so a
//! response that started before an invalidation can never overwrite data
//! fetched after it.

use crate::error::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Snapshot of a cached value and its freshness metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub stale: bool,
    pub in_flight: bool,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entry_count: usize,
    pub stale_count: usize,
    pub in_flight_count: usize,
}

struct InFlight<V> {
    generation: u64,
    sender: broadcast::Sender<Result<V>>,
    started_at: Instant,
}

struct Slot<V> {
    value: Option<(V, Instant)>,
    stale: bool,
    generation: u64,
    in_flight: Option<InFlight<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            stale: false,
            generation: 0,
            in_flight: None,
        }
    }
}

impl<V> Slot<V> {
    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match &self.value {
            Some((_, fetched_at)) => {
                !self.stale && max_age.map_or(true, |max| fetched_at.elapsed() < max)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Freshness {
    /// Serve the cached value if it is neither stale nor older than the bound
    IfFresh(Option<Duration>),
    /// Always load (still joins an in-flight load)
    Always,
}

enum Begin<V> {
    Hit(V),
    Follow(broadcast::Receiver<Result<V>>),
    Lead(u64),
}

/// Session-scoped keyed cache.
///
/// State lives behind a synchronous mutex that is never held across an
/// await point; all suspension happens in the loader or while waiting on
/// another caller's load.
pub struct RecordStore<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for RecordStore<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RecordStore<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Synchronous lookup of the last good value, stale or not.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let slots = self.lock();
        let slot = slots.get(key)?;
        let (value, fetched_at) = slot.value.as_ref()?;

        Some(CacheEntry {
            value: value.clone(),
            fetched_at: *fetched_at,
            stale: slot.stale,
            in_flight: slot.in_flight.is_some(),
        })
    }

    /// Return the cached value when fresh, otherwise load it.
    ///
    /// `max_age` bounds how long a value stays fresh after it was fetched;
    /// `None` means only an explicit invalidation makes it stale. Callers
    /// arriving while a load for `key` is running wait for that load instead
    /// of starting another. On failure the previous value and stale flag
    /// are kept and the error is returned.
    ///
    /// A successful return always carries a value that was written to the
    /// store. If an invalidation supersedes this caller's load, the caller
    /// waits for the newer load instead, so `loader` may run more than once.
    pub async fn fetch<F, Fut>(&self, key: &K, max_age: Option<Duration>, loader: F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.load(key, Freshness::IfFresh(max_age), loader).await
    }

    /// Load regardless of freshness, joining an in-flight load if present.
    ///
    /// Same write guarantee as [`fetch`](Self::fetch).
    pub async fn revalidate<F, Fut>(&self, key: &K, loader: F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.load(key, Freshness::Always, loader).await
    }

    async fn load<F, Fut>(&self, key: &K, mut freshness: Freshness, mut loader: F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        loop {
            let generation = loop {
                let mut receiver = match self.begin(key, freshness) {
                    Begin::Hit(value) => return Ok(value),
                    Begin::Lead(generation) => break generation,
                    Begin::Follow(receiver) => receiver,
                };

                match receiver.recv().await {
                    Ok(result) => return result,
                    // Leader was cancelled or detached by an invalidation
                    Err(_) => debug!(key = %key, "In-flight fetch abandoned, retrying"),
                }
            };

            let guard = LeadGuard {
                store: self,
                key,
                generation,
                settled: false,
            };
            let result = loader().await;
            if let Some(result) = guard.settle(result) {
                return result;
            }

            // Whatever lands after the superseding invalidation was loaded
            // after this caller's load started, so a fresh value is enough
            freshness = Freshness::IfFresh(None);
        }
    }

    fn begin(&self, key: &K, freshness: Freshness) -> Begin<V> {
        let mut slots = self.lock();
        let slot = slots.entry(key.clone()).or_default();

        if let Freshness::IfFresh(max_age) = freshness {
            if slot.is_fresh(max_age) {
                if let Some((value, _)) = &slot.value {
                    debug!(key = %key, "Cache hit");
                    return Begin::Hit(value.clone());
                }
            }
        }

        if let Some(in_flight) = &slot.in_flight {
            debug!(
                key = %key,
                generation = in_flight.generation,
                "Coalescing onto in-flight fetch"
            );
            return Begin::Follow(in_flight.sender.subscribe());
        }

        slot.generation += 1;
        let (sender, _) = broadcast::channel(1);
        slot.in_flight = Some(InFlight {
            generation: slot.generation,
            sender,
            started_at: Instant::now(),
        });

        debug!(key = %key, generation = slot.generation, stale = slot.stale, "Fetching");
        Begin::Lead(slot.generation)
    }

    /// Write back a leader's result. Returns `None` when a successful
    /// result was discarded because the load was superseded.
    fn settle(&self, key: &K, generation: u64, result: Result<V>) -> Option<Result<V>> {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return Some(result);
        };

        let in_flight = match slot.in_flight.take() {
            Some(in_flight) if in_flight.generation == generation => in_flight,
            other => {
                slot.in_flight = other;
                warn!(
                    key = %key,
                    generation = generation,
                    current = slot.generation,
                    "Discarding result of superseded fetch"
                );
                return result.is_err().then_some(result);
            }
        };

        if let Ok(value) = &result {
            slot.value = Some((value.clone(), Instant::now()));
            slot.stale = false;
        }

        debug!(
            key = %key,
            generation = generation,
            waiting = in_flight.sender.receiver_count(),
            duration_ms = in_flight.started_at.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Fetch settled"
        );

        // Receivers may have dropped
        let _ = in_flight.sender.send(result.clone());
        Some(result)
    }

    fn abandon(&self, key: &K, generation: u64) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(key) {
            if matches!(&slot.in_flight, Some(f) if f.generation == generation) {
                slot.in_flight = None;
                debug!(key = %key, generation = generation, "Fetch cancelled");
            }
        }
    }

    /// Mark one key stale. Returns false if nothing is cached under it.
    pub fn invalidate(&self, key: &K) -> bool {
        self.invalidate_many(std::slice::from_ref(key)) > 0
    }

    /// Mark several keys stale under a single lock acquisition, so no reader
    /// observes some of them invalidated and others not. Returns how many
    /// held a cached value.
    ///
    /// Values are kept (readers keep seeing them until a refetch lands).
    /// Any in-flight load on an invalidated key is detached: its result will
    /// not be written, and the next fetch issues a new load.
    pub fn invalidate_many<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut slots = self.lock();
        let mut marked = 0;

        for key in keys {
            let Some(slot) = slots.get_mut(key) else {
                continue;
            };
            slot.stale = true;
            slot.generation += 1;
            if let Some(detached) = slot.in_flight.take() {
                debug!(key = %key, generation = detached.generation, "Detached in-flight fetch");
            }
            if slot.value.is_some() {
                marked += 1;
            }
        }

        debug!(marked = marked, "Invalidated cache keys");
        marked
    }

    /// Keys currently holding a slot that match `pred`
    pub fn keys_where<P>(&self, mut pred: P) -> Vec<K>
    where
        P: FnMut(&K) -> bool,
    {
        let keys: Vec<K> = self.lock().keys().cloned().collect();
        keys.into_iter().filter(|k| pred(k)).collect()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.lock()
            .get(key)
            .map_or(false, |slot| slot.in_flight.is_some())
    }

    /// Whether a cached key is stale or older than `max_age`
    pub fn needs_refresh(&self, key: &K, max_age: Option<Duration>) -> bool {
        self.lock()
            .get(key)
            .map_or(false, |slot| !slot.is_fresh(max_age))
    }

    pub fn stats(&self) -> StoreStats {
        let slots = self.lock();
        StoreStats {
            entry_count: slots.values().filter(|s| s.value.is_some()).count(),
            stale_count: slots
                .values()
                .filter(|s| s.value.is_some() && s.stale)
                .count(),
            in_flight_count: slots.values().filter(|s| s.in_flight.is_some()).count(),
        }
    }
}

/// Releases the in-flight marker if the leading load is dropped before it
/// settles, so waiters can retry instead of hanging.
struct LeadGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    store: &'a RecordStore<K, V>,
    key: &'a K,
    generation: u64,
    settled: bool,
}

impl<'a, K, V> LeadGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    fn settle(mut self, result: Result<V>) -> Option<Result<V>> {
        self.settled = true;
        self.store.settle(self.key, self.generation, result)
    }
}

impl<'a, K, V> Drop for LeadGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.settled {
            self.store.abandon(self.key, self.generation);
        }
    }
}
