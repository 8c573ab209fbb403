//! Pending Request Module
//!
//! Registry of in-flight fetches keyed by normalized URL, and the
//! single-flight helper built on top of it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::cache::{normalize_key, SharedCache};
use crate::fetch::FetchError;

/// A cloneable handle to an in-flight fetch.
pub type PendingFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

// == Pending Requests ==
/// Bookkeeping of in-flight fetches.
///
/// The registry never starts or awaits anything itself; [`fetch_through`]
/// removes each marker once its fetch settles.
pub struct PendingRequests<V> {
    inflight: HashMap<String, PendingFetch<V>>,
}

impl<V> PendingRequests<V> {
    pub fn new() -> Self {
        Self {
            inflight: HashMap::new(),
        }
    }

    pub fn insert(&mut self, url: &str, fetch: PendingFetch<V>) {
        self.inflight.insert(normalize_key(url), fetch);
    }

    pub fn get(&self, url: &str) -> Option<PendingFetch<V>> {
        self.inflight.get(&normalize_key(url)).cloned()
    }

    pub fn remove(&mut self, url: &str) {
        self.inflight.remove(&normalize_key(url));
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

impl<V> Default for PendingRequests<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for PendingRequests<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("keys", &self.inflight.keys().collect::<Vec<_>>())
            .finish()
    }
}

// == Fetch Through ==
/// Returns the cached value for `url`, joining or starting a fetch on a miss.
///
/// Concurrent callers missing on the same key share one fetch. A registered
/// fetch is also driven by a spawned task, so it settles (marker cleared,
/// success stored in both tiers) even when every caller is dropped first.
pub async fn fetch_through<V, F, Fut>(
    cache: &SharedCache<V>,
    url: &str,
    fetch: F,
) -> Result<V, FetchError>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
{
    let pending = {
        let mut guard = cache.write().await;
        if let Some(value) = guard.get(url) {
            return Ok(value);
        }
        match guard.get_pending_request(url) {
            Some(pending) => {
                debug!(url = %url, "Joining in-flight fetch");
                pending
            }
            None => {
                let pending = fetch().boxed().shared();
                guard.set_pending_request(url, pending.clone());
                tokio::spawn(drive(cache.clone(), url.to_string(), pending.clone()));
                pending
            }
        }
    };

    let result = pending.clone().await;
    settle(cache, url, &pending, &result).await;
    result
}

/// Runs a registered fetch to completion independently of its callers.
async fn drive<V>(cache: SharedCache<V>, url: String, pending: PendingFetch<V>)
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let result = pending.clone().await;
    settle(&cache, &url, &pending, &result).await;
}

/// Clears the marker for `url` and stores a successful result.
///
/// Idempotent: only the first call for a given fetch finds its marker still
/// registered, so a result is stored once and a newer fetch is never cleared.
async fn settle<V>(
    cache: &SharedCache<V>,
    url: &str,
    pending: &PendingFetch<V>,
    result: &Result<V, FetchError>,
) where
    V: Serialize + DeserializeOwned + Clone,
{
    let mut guard = cache.write().await;
    let still_registered = guard
        .get_pending_request(url)
        .is_some_and(|current| current.ptr_eq(pending));
    if !still_registered {
        return;
    }

    guard.remove_pending_request(url);
    if let Ok(value) = result {
        guard.set(url, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, ResourceCache};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    fn shared_cache() -> SharedCache<String> {
        Arc::new(RwLock::new(ResourceCache::memory_only(CacheOptions::new(
            "test", 60_000, 120_000,
        ))))
    }

    #[test]
    fn test_registry_normalizes_keys() {
        let mut registry: PendingRequests<String> = PendingRequests::new();
        let fetch: PendingFetch<String> = async { Ok("v".to_string()) }.boxed().shared();

        registry.insert("https://idp/jwks/", fetch.clone());

        let found = registry.get("https://idp/jwks").unwrap();
        assert!(found.ptr_eq(&fetch));
        assert_eq!(registry.len(), 1);

        registry.remove("https://idp/jwks/");
        assert!(registry.is_empty());
        assert!(registry.get("https://idp/jwks").is_none());
    }

    #[tokio::test]
    async fn test_fetch_through_caches_result() {
        let cache = shared_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = fetch_through(&cache, "https://idp/doc", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("document".to_string())
            })
            .await
            .unwrap();
            assert_eq!(value, "document");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.read().await.get_pending_request("https://idp/doc").is_none());
    }

    #[tokio::test]
    async fn test_fetch_through_collapses_concurrent_misses() {
        let cache = shared_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                fetch_through(&cache, "https://idp/slow", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok("slow".to_string())
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "slow");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_through_failure_clears_marker() {
        let cache = shared_cache();

        let err = fetch_through(&cache, "https://idp/broken", || async {
            Err::<String, _>(FetchError::Network("connection refused".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(err, FetchError::Network("connection refused".to_string()));

        let mut guard = cache.write().await;
        assert!(guard.get_pending_request("https://idp/broken").is_none());
        assert!(guard.get("https://idp/broken").is_none());
    }

    #[tokio::test]
    async fn test_aborted_caller_does_not_strand_failed_fetch() {
        let cache = shared_cache();

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move {
                fetch_through(&cache, "https://idp/flaky", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<String, _>(FetchError::Network("transient".to_string()))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();

        // Let the abandoned fetch run out
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache
            .read()
            .await
            .get_pending_request("https://idp/flaky")
            .is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let value = fetch_through(&cache, "https://idp/flaky", move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok("recovered".to_string())
        })
        .await
        .unwrap();

        assert_eq!(value, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aborted_caller_still_stores_result() {
        let cache = shared_cache();

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move {
                fetch_through(&cache, "https://idp/slow", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("document".to_string())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut guard = cache.write().await;
        assert!(guard.get_pending_request("https://idp/slow").is_none());
        assert_eq!(guard.get("https://idp/slow"), Some("document".to_string()));
    }

    #[tokio::test]
    async fn test_settled_marker_left_behind_is_not_reused() {
        let cache = shared_cache();
        let stale: PendingFetch<String> =
            async { Err(FetchError::Network("transient".to_string())) }
                .boxed()
                .shared();
        let _ = stale.clone().await;
        cache
            .write()
            .await
            .set_pending_request("https://idp/doc", stale);

        // Joining the settled fetch clears it
        let err = fetch_through(&cache, "https://idp/doc", || async {
            Ok::<_, FetchError>("unused".to_string())
        })
        .await
        .unwrap_err();
        assert_eq!(err, FetchError::Network("transient".to_string()));

        let value = fetch_through(&cache, "https://idp/doc", || async {
            Ok::<_, FetchError>("fresh".to_string())
        })
        .await
        .unwrap();
        assert_eq!(value, "fresh");
    }
}
