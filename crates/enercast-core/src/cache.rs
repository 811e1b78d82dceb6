//! In-memory model cache with single-flight loading and LRU eviction.
//!
//! Two narrow critical sections guard the shared state:
//!
//! - `inflight` maps a key to the shared future of its pending load, so
//!   concurrent misses on one key wait on a single load while other keys load
//!   independently.
//! - `resident` holds loaded handles plus LRU bookkeeping.
//!
//! Lock order is `inflight` then `resident`; the load completion path takes
//! them one at a time. No lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::config::ModelCacheConfig;
use crate::domain::ArtifactId;
use crate::model::{build_model, ModelHandle};
use crate::EngineError;

type LoadFuture = Shared<BoxFuture<'static, Result<ModelHandle, EngineError>>>;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    pub resident: usize,
}

#[derive(Debug)]
struct ResidentEntry {
    handle: ModelHandle,
    last_used: u64,
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<ArtifactId, ResidentEntry>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, id: &ArtifactId) -> Option<ModelHandle> {
        let tick = self.next_tick();
        self.entries.get_mut(id).map(|entry| {
            entry.last_used = tick;
            Arc::clone(&entry.handle)
        })
    }

    /// Inserts and returns the keys evicted to get back under `capacity`.
    fn insert(&mut self, id: ArtifactId, handle: ModelHandle, capacity: usize) -> Vec<ArtifactId> {
        let last_used = self.next_tick();
        self.entries.insert(id, ResidentEntry { handle, last_used });

        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

struct CacheInner {
    store: Arc<dyn ArtifactStore>,
    capacity: usize,
    inflight: Mutex<HashMap<ArtifactId, LoadFuture>>,
    resident: Mutex<LruState>,
    counters: Counters,
}

impl CacheInner {
    fn inflight(&self) -> MutexGuard<'_, HashMap<ArtifactId, LoadFuture>> {
        self.inflight
            .lock()
            .expect("model cache inflight lock is not poisoned")
    }

    fn resident(&self) -> MutexGuard<'_, LruState> {
        self.resident
            .lock()
            .expect("model cache resident lock is not poisoned")
    }

    fn complete(&self, id: &ArtifactId, result: &Result<ModelHandle, EngineError>) {
        match result {
            Ok(handle) => {
                let evicted = self
                    .resident()
                    .insert(id.clone(), Arc::clone(handle), self.capacity);
                for key in evicted {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(artifact = %key, "evicted least recently used model");
                }
            }
            Err(err) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(artifact = %id, code = err.code(), error = %err, "model load failed");
            }
        }
        self.inflight().remove(id);
    }
}

/// Shared cache of deserialized models. Cloning shares the same cache.
#[derive(Clone)]
pub struct ModelCache {
    inner: Arc<CacheInner>,
}

impl ModelCache {
    pub fn new(store: Arc<dyn ArtifactStore>, config: ModelCacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                capacity: config.capacity.max(1),
                inflight: Mutex::new(HashMap::new()),
                resident: Mutex::new(LruState::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Returns the resident handle or loads it, sharing one load per key.
    ///
    /// Every caller waiting on the same load receives the same handle or the
    /// same error. Failures are not cached and not retried here.
    pub async fn get_or_load(&self, id: &ArtifactId) -> Result<ModelHandle, EngineError> {
        let cached = self.inner.resident().touch(id);
        if let Some(handle) = cached {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(artifact = %id, "model cache hit");
            return Ok(handle);
        }

        let pending = {
            let mut inflight = self.inner.inflight();
            // A load may have finished between the first check and taking the lock.
            let finished = self.inner.resident().touch(id);
            if let Some(handle) = finished {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(handle);
            }
            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            inflight
                .entry(id.clone())
                .or_insert_with(|| self.start_load(id.clone()))
                .clone()
        };

        pending.await
    }

    fn start_load(&self, id: ArtifactId) -> LoadFuture {
        let store = Arc::clone(&self.inner.store);
        let cache: Weak<CacheInner> = Arc::downgrade(&self.inner);

        async move {
            tracing::debug!(artifact = %id, "loading model artifact");
            let result = store
                .load(&id)
                .await
                .and_then(|artifact| build_model(&artifact))
                .map(Arc::new);

            if let Some(cache) = cache.upgrade() {
                cache.counters.loads.fetch_add(1, Ordering::Relaxed);
                cache.complete(&id, &result);
            }
            if result.is_ok() {
                tracing::info!(artifact = %id, "model loaded");
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drops the cache's reference; handles already handed out stay valid.
    pub fn invalidate(&self, id: &ArtifactId) -> bool {
        self.inner.resident().entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.inner.resident().entries.clear();
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.inner.resident().entries.contains_key(id)
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            loads: counters.loads.load(Ordering::Relaxed),
            load_failures: counters.load_failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            resident: self.inner.resident().entries.len(),
        }
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("capacity", &self.inner.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use crate::domain::{
        Frequency, ModelArtifact, ModelFamily, ModelVersion, Symbol, TradeDate,
    };

    fn id(symbol: &str, version: u32) -> ArtifactId {
        ArtifactId::new(
            Symbol::parse(symbol).expect("symbol"),
            ModelFamily::Naive,
            ModelVersion::new(version),
        )
    }

    fn store_with(ids: &[ArtifactId]) -> InMemoryArtifactStore {
        let store = InMemoryArtifactStore::new();
        for id in ids {
            let artifact = ModelArtifact::new(
                id.clone(),
                TradeDate::parse("2023-12-31").expect("date"),
                Frequency::Daily,
                5,
                7,
                serde_json::json!({}),
            )
            .expect("artifact");
            store.insert(artifact, true);
        }
        store
    }

    #[tokio::test]
    async fn second_lookup_is_a_hit() {
        let key = id("WTI", 1);
        let store = store_with(&[key.clone()]);
        let cache = ModelCache::new(Arc::new(store.clone()), ModelCacheConfig { capacity: 2 });

        let first = cache.get_or_load(&key).await.expect("load");
        let second = cache.get_or_load(&key).await.expect("hit");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.load_count(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.loads), (1, 1, 1));
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let (a, b, c) = (id("WTI", 1), id("BRENT", 1), id("HH", 1));
        let store = store_with(&[a.clone(), b.clone(), c.clone()]);
        let cache = ModelCache::new(Arc::new(store), ModelCacheConfig { capacity: 2 });

        cache.get_or_load(&a).await.expect("a");
        cache.get_or_load(&b).await.expect("b");
        cache.get_or_load(&a).await.expect("touch a");
        cache.get_or_load(&c).await.expect("c");

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let missing = id("WTI", 9);
        let store = store_with(&[]);
        let cache = ModelCache::new(Arc::new(store.clone()), ModelCacheConfig::default());

        let err = cache.get_or_load(&missing).await.expect_err("missing");
        assert!(matches!(err, EngineError::ArtifactLoad { .. }));
        assert!(!cache.contains(&missing));

        let _ = cache.get_or_load(&missing).await;
        assert_eq!(store.load_count(), 2);
        assert_eq!(cache.stats().load_failures, 2);
    }

    #[tokio::test]
    async fn invalidate_keeps_outstanding_handles_alive() {
        let key = id("WTI", 1);
        let cache = ModelCache::new(
            Arc::new(store_with(&[key.clone()])),
            ModelCacheConfig::default(),
        );

        let handle = cache.get_or_load(&key).await.expect("load");
        assert!(cache.invalidate(&key));
        assert_eq!(handle.id, key);
        assert_eq!(handle.max_horizon(), 7);
    }

    #[tokio::test]
    async fn clear_keeps_handed_out_handles() {
        let key = id("WTI", 1);
        let store = store_with(&[key.clone()]);
        let cache = ModelCache::new(Arc::new(store), ModelCacheConfig::default());

        let held = cache.get_or_load(&key).await.expect("load");
        cache.clear();

        assert_eq!(cache.stats().resident, 0);
        assert_eq!(held.id, key);
        assert_eq!(held.max_horizon(), 7);
    }
}
