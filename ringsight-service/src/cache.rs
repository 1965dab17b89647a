// Copyright 2026 Ringsight (https://github.com/ringsight)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Result caching layer
//!
//! Memoizes detector scores and explanation reports per account with TTL
//! and single-flight de-duplication: concurrent callers for the same key
//! coalesce into one execution of the compute future and all receive its
//! result. An optional shared backing store fronts the computation; any
//! backend failure is logged and absorbed, degrading to node-local caching
//! rather than uncached behavior.

use async_trait::async_trait;
use moka::future::Cache;
use ringsight_core::AccountId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors from a cache backing store. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend serialization error: {0}")]
    Serialization(String),
}

/// Optional shared backing store (e.g. a networked key-value cache).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), BackendError>;
}

/// Configuration for one result cache
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    pub max_entries: u64,
    pub ttl: Duration,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

/// Per-account memoization with TTL and single-flight semantics
pub struct ResultCache<T: Clone + Send + Sync + 'static> {
    cache: Cache<AccountId, T>,
    backend: Option<Arc<dyn CacheBackend>>,
    prefix: &'static str,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> ResultCache<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(prefix: &'static str, config: ResultCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self {
            cache,
            backend: None,
            prefix,
            ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    fn backend_key(&self, key: AccountId) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Fetch or compute the value for `key`. Concurrent callers for the
    /// same key block on the first caller's in-flight computation and all
    /// receive the same result; a caller that drops its future does not
    /// abort the shared computation.
    pub async fn get_or_compute<F, Fut>(&self, key: AccountId, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        self.cache
            .get_with(key, async move {
                if let Some(value) = self.backend_get(key).await {
                    return value;
                }
                let value = compute().await;
                self.backend_put(key, &value).await;
                value
            })
            .await
    }

    /// Like [`get_or_compute`] for fallible computations. Errors are shared
    /// with concurrent callers but never cached.
    ///
    /// [`get_or_compute`]: ResultCache::get_or_compute
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: AccountId, compute: F) -> Result<T, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Send + Sync + 'static,
    {
        if let Some(value) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        self.cache
            .try_get_with(key, async move {
                if let Some(value) = self.backend_get(key).await {
                    return Ok(value);
                }
                let value = compute().await?;
                self.backend_put(key, &value).await;
                Ok(value)
            })
            .await
    }

    async fn backend_get(&self, key: AccountId) -> Option<T> {
        let backend = self.backend.as_ref()?;
        match backend.get(&self.backend_key(key)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(prefix = self.prefix, key, error = %e, "backend returned undecodable value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                // Backend outage degrades to node-local caching.
                warn!(prefix = self.prefix, key, error = %e, "cache backend read failed");
                None
            }
        }
    }

    async fn backend_put(&self, key: AccountId, value: &T) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(prefix = self.prefix, key, error = %e, "cache value serialization failed");
                return;
            }
        };
        if let Err(e) = backend.put(&self.backend_key(key), bytes, self.ttl).await {
            warn!(prefix = self.prefix, key, error = %e, "cache backend write failed");
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Barrier;

    fn small_cache(ttl: Duration) -> ResultCache<u64> {
        ResultCache::new(
            "test",
            ResultCacheConfig {
                max_entries: 100,
                ttl,
            },
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_one_execution() {
        let cache = Arc::new(small_cache(Duration::from_secs(60)));
        let executions = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let executions = Arc::clone(&executions);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_compute(7, || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42u64
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(
            executions.load(Ordering::SeqCst),
            1,
            "concurrent callers must coalesce into one execution"
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_within_ttl_skip_compute() {
        let cache = small_cache(Duration::from_secs(60));
        let executions = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(1, || async {
                executions.fetch_add(1, Ordering::SeqCst);
                11u64
            })
            .await;
        let second = cache
            .get_or_compute(1, || async {
                executions.fetch_add(1, Ordering::SeqCst);
                99u64
            })
            .await;

        assert_eq!(first, 11);
        assert_eq!(second, 11, "cached result returned unchanged");
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_recomputes() {
        let cache = small_cache(Duration::from_millis(50));
        let executions = AtomicUsize::new(0);

        let compute = |v: u64| {
            let executions = &executions;
            move || async move {
                executions.fetch_add(1, Ordering::SeqCst);
                v
            }
        };

        assert_eq!(cache.get_or_compute(1, compute(1)).await, 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_or_compute(1, compute(2)).await, 2);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_not_cached() {
        let cache = small_cache(Duration::from_secs(60));
        let attempts = AtomicUsize::new(0);

        let failed: Result<u64, Arc<String>> = cache
            .get_or_try_compute(1, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;
        assert!(failed.is_err());

        let ok: Result<u64, Arc<String>> = cache
            .get_or_try_compute(1, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(5u64)
            })
            .await;
        assert_eq!(ok.unwrap(), 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    /// Backend that always fails: the cache must keep serving from the
    /// in-process layer with identical single-flight semantics.
    struct OutageBackend;

    #[async_trait]
    impl CacheBackend for OutageBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
            Err(BackendError::Unavailable("connection refused".into()))
        }

        async fn put(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> Result<(), BackendError> {
            Err(BackendError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_backend_outage_degrades_to_local_cache() {
        let cache = small_cache(Duration::from_secs(60)).with_backend(Arc::new(OutageBackend));
        let executions = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute(3, || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    77u64
                })
                .await;
            assert_eq!(value, 77);
        }
        assert_eq!(
            executions.load(Ordering::SeqCst),
            1,
            "outage must not cause repeated computation"
        );
    }

    /// In-memory backend used to verify read-through behavior.
    struct MapBackend {
        entries: DashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl CacheBackend for MapBackend {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
            Ok(self.entries.get(key).map(|e| e.clone()))
        }

        async fn put(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), BackendError> {
            self.entries.insert(key.to_string(), value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_backend_read_through() {
        let backend = Arc::new(MapBackend {
            entries: DashMap::new(),
        });
        backend
            .entries
            .insert("test:9".to_string(), serde_json::to_vec(&123u64).unwrap());

        let cache = small_cache(Duration::from_secs(60)).with_backend(backend);
        let value = cache
            .get_or_compute(9, || async {
                panic!("backend hit must not trigger compute")
            })
            .await;
        assert_eq!(value, 123);
    }

    #[tokio::test]
    async fn test_backend_write_through() {
        let backend = Arc::new(MapBackend {
            entries: DashMap::new(),
        });
        let cache = small_cache(Duration::from_secs(60))
            .with_backend(Arc::clone(&backend) as Arc<dyn CacheBackend>);

        cache.get_or_compute(4, || async { 55u64 }).await;
        assert!(backend.entries.contains_key("test:4"));
    }
}
