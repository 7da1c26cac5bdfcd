//! Cached search read path.
//!
//! Reads go cache-first, then the live correlated call when the connection
//! is up, then the stateless HTTP fallback. A failed fetch degrades to any
//! cached entry for the key, even an expired one; the error only propagates
//! when the key was never cached at all.

use crate::cache::{TtlCache, canonical_key};
use async_trait::async_trait;
use opal_core::error::Result;
use opal_transport::http::{HttpClient, SearchHit};
use opal_transport::{ConnectionManager, ConnectionState, RequestBroker, events};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Maximum results requested from the backend.
const MAX_RESULTS: u32 = 50;

/// The network side of the search read path.
///
/// Split out as a trait so the service logic can be tested with a scripted
/// backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Whether the live socket path is currently available.
    async fn connected(&self) -> bool;
    /// Search over the correlated socket call.
    async fn search_live(&self, query: &str) -> Result<Vec<SearchHit>>;
    /// Search over the stateless HTTP endpoint.
    async fn search_http(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Production backend: broker when connected, HTTP otherwise.
pub struct RemoteSearchBackend {
    connection: Arc<ConnectionManager>,
    broker: Arc<RequestBroker>,
    http: Arc<HttpClient>,
    call_timeout: Duration,
}

impl RemoteSearchBackend {
    pub fn new(
        connection: Arc<ConnectionManager>,
        broker: Arc<RequestBroker>,
        http: Arc<HttpClient>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            broker,
            http,
            call_timeout,
        }
    }
}

#[async_trait]
impl SearchBackend for RemoteSearchBackend {
    async fn connected(&self) -> bool {
        self.connection.state().await == ConnectionState::Connected
    }

    async fn search_live(&self, query: &str) -> Result<Vec<SearchHit>> {
        let payload = self
            .broker
            .call(
                events::SEARCH_PROMPTS,
                json!({ "q": query, "use_vector": true, "max_results": MAX_RESULTS }),
                self.call_timeout,
            )
            .await?;
        let hits = serde_json::from_value(
            payload.get("results").cloned().unwrap_or(json!([])),
        )?;
        Ok(hits)
    }

    async fn search_http(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.http.search(query, MAX_RESULTS).await
    }
}

/// Cache-first search service.
pub struct SearchService {
    cache: TtlCache<Vec<SearchHit>>,
    backend: Arc<dyn SearchBackend>,
}

impl SearchService {
    pub fn new(backend: Arc<dyn SearchBackend>, ttl: Duration, capacity: usize) -> Self {
        Self {
            cache: TtlCache::new(ttl, capacity),
            backend,
        }
    }

    /// Starts the periodic cache sweep. Abort the handle on shutdown.
    pub fn start_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.cache.start_sweeper(interval)
    }

    /// Fetches search results for `query`.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error only when no cached entry (fresh or
    /// stale) exists for the key.
    pub async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>> {
        let key = canonical_key(query);

        if let Some(hits) = self.cache.get_fresh(&key).await {
            tracing::debug!(%key, "search cache hit");
            return Ok(hits);
        }

        let fetched = if self.backend.connected().await {
            self.backend.search_live(query).await
        } else {
            self.backend.search_http(query).await
        };

        match fetched {
            Ok(hits) => {
                self.cache.insert(key, hits.clone()).await;
                Ok(hits)
            }
            Err(e) => match self.cache.get_any(&key).await {
                Some(stale) => {
                    tracing::warn!(%key, "search fetch failed, serving stale entry: {}", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::error::OpalError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct ScriptedBackend {
        connected: AtomicBool,
        fail: AtomicBool,
        live_calls: AtomicU32,
        http_calls: AtomicU32,
        hits: Mutex<Vec<SearchHit>>,
    }

    impl ScriptedBackend {
        fn new(hits: Vec<SearchHit>) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                live_calls: AtomicU32::new(0),
                http_calls: AtomicU32::new(0),
                hits: Mutex::new(hits),
            })
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: format!("title {}", id),
            content: "content".to_string(),
            score: 1.0,
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn search_live(&self, _query: &str) -> Result<Vec<SearchHit>> {
            self.live_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(OpalError::timeout("search_prompts", 100));
            }
            Ok(self.hits.lock().unwrap().clone())
        }

        async fn search_http(&self, _query: &str) -> Result<Vec<SearchHit>> {
            self.http_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(OpalError::remote("/api/v2/search/prompts", "http down"));
            }
            Ok(self.hits.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_network() {
        let backend = ScriptedBackend::new(vec![hit("1")]);
        let service = SearchService::new(backend.clone(), Duration::from_secs(60), 16);

        let first = service.fetch("Write a haiku").await.unwrap();
        // Same canonical key: served from cache, no second network call.
        let second = service.fetch("  write A   haiku ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.live_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_refetch() {
        let backend = ScriptedBackend::new(vec![hit("1")]);
        let service = SearchService::new(backend.clone(), Duration::from_millis(20), 16);

        service.fetch("q").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        service.fetch("q").await.unwrap();

        assert_eq!(backend.live_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_fallback_when_disconnected() {
        let backend = ScriptedBackend::new(vec![hit("1")]);
        backend.connected.store(false, Ordering::SeqCst);
        let service = SearchService::new(backend.clone(), Duration::from_secs(60), 16);

        service.fetch("q").await.unwrap();

        assert_eq!(backend.live_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.http_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_fetch_failure() {
        let backend = ScriptedBackend::new(vec![hit("1")]);
        let service = SearchService::new(backend.clone(), Duration::from_millis(20), 16);

        let original = service.fetch("q").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Entry expired and the refetch fails: the stale entry is served.
        backend.fail.store(true, Ordering::SeqCst);
        let degraded = service.fetch("q").await.unwrap();
        assert_eq!(degraded, original);
    }

    #[tokio::test]
    async fn test_error_propagates_without_any_cache_entry() {
        let backend = ScriptedBackend::new(vec![]);
        backend.fail.store(true, Ordering::SeqCst);
        let service = SearchService::new(backend.clone(), Duration::from_secs(60), 16);

        let err = service.fetch("never seen").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
