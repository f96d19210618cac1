//! LRU schema cache with in-flight coalescing, keyed by `(upstream, tool)`
//! (spec §4.4): when lazy-loading is enabled, tool input schemas are fetched
//! on demand rather than eagerly during `tools/list`, and concurrent
//! requests for the same uncached schema share one upstream round-trip.

use lru::LruCache;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
struct Entry {
    value: Value,
    fetched_at: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub coalesced: u64,
}

pub struct SchemaCache {
    cache: Mutex<LruCache<(String, String), Entry>>,
    ttl: Option<Duration>,
    in_flight: dashmap::DashMap<u64, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced: AtomicU64,
}

fn key_hash(upstream: &str, tool: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    upstream.hash(&mut hasher);
    tool.hash(&mut hasher);
    hasher.finish()
}

impl SchemaCache {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("capacity must be nonzero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            in_flight: dashmap::DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Fetch a schema, consulting the cache first. `fetch` is only invoked
    /// on a cache miss; concurrent misses for the same key share one call.
    pub async fn get_or_fetch<F, Fut>(&self, upstream: &str, tool: &str, fetch: F) -> crate::error::ProxyResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = crate::error::ProxyResult<Value>>,
    {
        let key = (upstream.to_string(), tool.to_string());

        if let Some(value) = self.try_get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let hash = key_hash(upstream, tool);
        let lock = self.in_flight.entry(hash).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring the in-flight lock: another caller may
        // have populated the cache while we were waiting.
        if let Some(value) = self.try_get(&key).await {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            self.in_flight.remove(&hash);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = fetch().await;
        self.in_flight.remove(&hash);

        if let Ok(value) = &result {
            let mut cache = self.cache.lock().await;
            if cache.len() == cache.cap().get() && !cache.contains(&key) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            cache.put(key, Entry { value: value.clone(), fetched_at: Instant::now() });
        }

        result
    }

    async fn try_get(&self, key: &(String, String)) -> Option<Value> {
        let mut cache = self.cache.lock().await;
        let entry = cache.get(key)?.clone();
        if let Some(ttl) = self.ttl {
            if entry.fetched_at.elapsed() > ttl {
                cache.pop(key);
                return None;
            }
        }
        Some(entry.value)
    }

    pub async fn invalidate(&self, upstream: &str, tool: &str) {
        self.cache.lock().await.pop(&(upstream.to_string(), tool.to_string()));
    }

    pub async fn invalidate_upstream(&self, upstream: &str) {
        let mut cache = self.cache.lock().await;
        let stale: Vec<(String, String)> = cache.iter().map(|(k, _)| k.clone()).filter(|(u, _)| u == upstream).collect();
        for key in stale {
            cache.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = SchemaCache::new(8, None);
        let calls = AtomicUsize::new(0);

        let v1 = cache
            .get_or_fetch("weather", "forecast", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"type": "object"}))
            })
            .await
            .unwrap();
        assert_eq!(v1, serde_json::json!({"type": "object"}));

        let v2 = cache
            .get_or_fetch("weather", "forecast", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"type": "object"}))
            })
            .await
            .unwrap();
        assert_eq!(v2, v1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let cache = Arc::new(SchemaCache::new(8, None));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("weather", "forecast", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(serde_json::json!({"type": "object"}))
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let cache = SchemaCache::new(8, Some(Duration::from_millis(10)));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_fetch("weather", "forecast", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({}))
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_upstream_drops_only_that_upstreams_entries() {
        let cache = SchemaCache::new(8, None);
        cache.get_or_fetch("a", "t1", || async { Ok(serde_json::json!({})) }).await.unwrap();
        cache.get_or_fetch("b", "t1", || async { Ok(serde_json::json!({})) }).await.unwrap();

        cache.invalidate_upstream("a").await;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        cache
            .get_or_fetch("a", "t1", || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({}))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1); // re-fetched, proving it was evicted
    }
}
