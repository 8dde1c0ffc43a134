//! Result cache with single-flight de-duplication
//!
//! Keyed by normalized text. A first-time key gets an in-flight `OnceCell`
//! slot: the first caller runs the cascade, every concurrent caller for the
//! same key awaits that one computation instead of starting its own. If the
//! computing caller is cancelled, a waiting caller takes over.
//!
//! Finished results move from the in-flight map into a bounded LRU with
//! optional time-based expiry. Only finished results are ever evicted, so
//! capacity pressure cannot split an in-flight computation. The lock is held
//! only for map bookkeeping, never across an `.await`.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use vigilis_core::ClassificationResult;

/// Default maximum number of cached results.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A freshly computed result and whether it may be kept
#[derive(Debug, Clone)]
pub struct Computed {
    /// Final result for the record
    pub result: ClassificationResult,

    /// Keep in the cache after in-flight waiters are served
    pub retain: bool,
}

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Stored result from an earlier computation
    Hit,
    /// Shared an in-flight computation started by another caller
    Joined,
    /// This caller ran the computation
    Computed,
}

/// Outcome of [`ResultCache::get_or_compute`]
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    /// The result as stored (tier is the one that computed it)
    pub result: ClassificationResult,

    /// How it was obtained
    pub origin: CacheOrigin,
}

/// Statistics snapshot from a [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from a stored result
    pub hits: u64,
    /// Lookups that started a computation
    pub misses: u64,
    /// Lookups that joined an in-flight computation
    pub coalesced: u64,
    /// Stored results plus in-flight keys
    pub entries: usize,
    /// Maximum number of stored results before LRU eviction
    pub capacity: usize,
}

#[derive(Debug, Clone)]
struct Stored {
    result: ClassificationResult,
    retain: bool,
    created: Instant,
}

type Slot = Arc<OnceCell<Stored>>;

struct CacheState {
    stored: LruCache<String, Stored>,
    in_flight: HashMap<String, Slot>,
    hits: u64,
    misses: u64,
    coalesced: u64,
}

/// Shared, read-mostly result cache
pub struct ResultCache {
    state: Mutex<CacheState>,
    ttl: Option<Duration>,
}

enum Claim {
    Hit(ClassificationResult),
    Wait(Slot),
}

impl ResultCache {
    /// Create a cache; a zero capacity is treated as one
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                stored: LruCache::new(capacity),
                in_flight: HashMap::new(),
                hits: 0,
                misses: 0,
                coalesced: 0,
            }),
            ttl,
        }
    }

    /// Stored result for `key`, if present and fresh; does not touch recency
    pub fn peek(&self, key: &str) -> Option<ClassificationResult> {
        let state = self.state.lock();
        state
            .stored
            .peek(key)
            .filter(|stored| !self.is_expired(stored))
            .map(|stored| stored.result.clone())
    }

    /// Stored result for `key`, counted as a hit when found
    pub fn lookup(&self, key: &str) -> Option<ClassificationResult> {
        let mut state = self.state.lock();
        let found = self.fresh(&mut state, key);
        if found.is_some() {
            state.hits += 1;
        }
        found
    }

    /// Return the cached result for `key`, or run `compute` exactly once
    /// across all concurrent callers for that key
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> CacheOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Computed>,
    {
        let slot = match self.claim(key) {
            Claim::Hit(result) => {
                return CacheOutcome {
                    result,
                    origin: CacheOrigin::Hit,
                }
            }
            Claim::Wait(slot) => slot,
        };

        let ran = AtomicBool::new(false);
        let ran_ref = &ran;
        let stored = slot
            .get_or_init(move || async move {
                ran_ref.store(true, Ordering::Relaxed);
                let computed = compute().await;
                Stored {
                    result: computed.result,
                    retain: computed.retain,
                    created: Instant::now(),
                }
            })
            .await
            .clone();

        if ran.load(Ordering::Relaxed) {
            self.settle(key, &slot, &stored);
            CacheOutcome {
                result: stored.result,
                origin: CacheOrigin::Computed,
            }
        } else {
            CacheOutcome {
                result: stored.result,
                origin: CacheOrigin::Joined,
            }
        }
    }

    /// Drop every stored result; in-flight computations still finish
    pub fn clear(&self) {
        self.state.lock().stored.clear();
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            entries: state.stored.len() + state.in_flight.len(),
            capacity: state.stored.cap().get(),
        }
    }

    fn claim(&self, key: &str) -> Claim {
        let mut state = self.state.lock();

        if let Some(result) = self.fresh(&mut state, key) {
            state.hits += 1;
            return Claim::Hit(result);
        }

        if let Some(slot) = state.in_flight.get(key).cloned() {
            state.coalesced += 1;
            return Claim::Wait(slot);
        }

        state.misses += 1;
        let slot: Slot = Arc::new(OnceCell::new());
        state.in_flight.insert(key.to_string(), Arc::clone(&slot));
        Claim::Wait(slot)
    }

    /// Move a finished computation out of the in-flight map
    fn settle(&self, key: &str, slot: &Slot, stored: &Stored) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            state.in_flight.remove(key);
        }
        if stored.retain {
            state.stored.put(key.to_string(), stored.clone());
        }
    }

    /// Fresh stored result, promoting it; expired entries are dropped
    fn fresh(&self, state: &mut CacheState, key: &str) -> Option<ClassificationResult> {
        let expired = match state.stored.get(key) {
            Some(stored) if !self.is_expired(stored) => return Some(stored.result.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.stored.pop(key);
        }
        None
    }

    fn is_expired(&self, stored: &Stored) -> bool {
        self.ttl
            .is_some_and(|ttl| stored.created.elapsed() >= ttl)
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use vigilis_core::Tier;

    fn computed(label: &str, retain: bool) -> Computed {
        Computed {
            result: ClassificationResult::new(label, 0.9, Tier::Semantic),
            retain,
        }
    }

    fn must_not_recompute() -> Computed {
        panic!("cached result must not be recomputed")
    }

    #[tokio::test]
    async fn test_second_lookup_hits() {
        let cache = ResultCache::new(16, None);

        let first = cache.get_or_compute("k", || async { computed("Error", true) }).await;
        assert_eq!(first.origin, CacheOrigin::Computed);

        let second = cache
            .get_or_compute("k", || async { must_not_recompute() })
            .await;
        assert_eq!(second.origin, CacheOrigin::Hit);
        assert_eq!(second.result, first.result);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));

        assert!(cache.lookup("k").is_some());
        assert!(cache.peek("k").is_some());
        assert_eq!(cache.stats().hits, 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(ResultCache::new(16, None));
        let calls = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_compute("same text", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            computed("Service Outage", true)
                        })
                        .await
                })
            })
            .collect();

        let outcomes: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcomes.iter().all(|o| o.result.label == "Service Outage"));
        assert_eq!(
            outcomes.iter().filter(|o| o.origin == CacheOrigin::Computed).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unretained_result_is_recomputed() {
        let cache = ResultCache::new(16, None);
        cache.get_or_compute("k", || async { computed("Unclassified", false) }).await;
        assert_eq!(cache.stats().entries, 0);
        assert!(cache.peek("k").is_none());

        let again = cache.get_or_compute("k", || async { computed("Error", true) }).await;
        assert_eq!(again.origin, CacheOrigin::Computed);
        assert_eq!(again.result.label, "Error");
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = ResultCache::new(2, None);
        for key in ["a", "b", "c"] {
            cache.get_or_compute(key, || async { computed("Error", true) }).await;
        }
        assert_eq!(cache.stats().entries, 2);
        assert!(cache.peek("a").is_none());
        assert!(cache.peek("b").is_some());
        assert!(cache.peek("c").is_some());

        // A hit refreshes recency
        assert!(cache.lookup("b").is_some());
        cache.get_or_compute("d", || async { computed("Error", true) }).await;
        assert!(cache.peek("b").is_some());
        assert!(cache.peek("c").is_none());
    }

    #[tokio::test]
    async fn test_reinserted_key_evicts_oldest_entry() {
        let cache = ResultCache::new(2, None);
        cache.get_or_compute("a", || async { computed("Unclassified", false) }).await;
        cache.get_or_compute("b", || async { computed("Error", true) }).await;
        cache.get_or_compute("a", || async { computed("Error", true) }).await;
        cache.get_or_compute("c", || async { computed("Error", true) }).await;

        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());
        assert!(cache.peek("c").is_some());
    }

    #[tokio::test]
    async fn test_in_flight_key_survives_capacity_pressure() {
        let cache = Arc::new(ResultCache::new(1, None));
        let calls = Arc::new(AtomicU32::new(0));

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute("slow", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        computed("Service Outage", true)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        for key in ["x", "y", "z"] {
            cache.get_or_compute(key, || async { computed("Error", true) }).await;
        }

        let second = cache
            .get_or_compute("slow", || async { must_not_recompute() })
            .await;
        let first = first.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.origin, CacheOrigin::Computed);
        assert_eq!(second.origin, CacheOrigin::Joined);
        assert_eq!(second.result.label, "Service Outage");
        assert_eq!(cache.stats().coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = ResultCache::new(4, Some(Duration::from_secs(30)));
        cache.get_or_compute("k", || async { computed("Error", true) }).await;
        assert!(cache.peek("k").is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.peek("k").is_none());

        let outcome = cache.get_or_compute("k", || async { computed("Error", true) }).await;
        assert_eq!(outcome.origin, CacheOrigin::Computed);
    }

    #[tokio::test]
    async fn test_cancelled_computation_is_taken_over() {
        let cache = Arc::new(ResultCache::new(4, None));

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_compute("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        computed("Never", true)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        slow.abort();
        let _ = slow.await;

        let outcome = cache.get_or_compute("k", || async { computed("Error", true) }).await;
        assert_eq!(outcome.result.label, "Error");
    }
}
