//! In-memory TTL cache for raw pages.
//!
//! [`CachingTransport`] wraps any [`Transport`] and answers repeated page queries
//! from memory until they expire. Entries are keyed by a SHA-256 of the page
//! query. Cached bodies are returned as fetched; the core re-filters every page
//! against the parameters it was requested under, so a stale body can at worst
//! be incomplete, never wrong.

pub mod key;

pub use key::cache_key;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sift_core::{AppConfig, BoxError, PageQuery, Transport};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Value,
    expires_at: DateTime<Utc>,
}

/// Transport decorator caching raw pages for a fixed time-to-live.
#[derive(Debug)]
pub struct CachingTransport<X> {
    inner: X,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<X: Transport> CachingTransport<X> {
    pub fn new(inner: X, ttl: Duration) -> Self {
        Self { inner, ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Cache with entries living `cache_ttl_secs`.
    pub fn from_app_config(inner: X, config: &AppConfig) -> Self {
        Self::new(inner, Duration::try_seconds(config.cache_ttl_secs).unwrap_or(Duration::MAX))
    }

    pub fn inner(&self) -> &X {
        &self.inner
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    ///
    /// Expired entries are also evicted whenever a fetched page is inserted.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = entries.len(), "purged expired pages");
        }
        purged
    }

    /// Drop every entry.
    pub async fn invalidate_all(&self) {
        self.entries.lock().await.clear();
    }

    async fn lookup(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.body.clone())
    }
}

#[async_trait]
impl<X: Transport> Transport for CachingTransport<X> {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, BoxError> {
        let key = cache_key(query);

        if let Some(body) = self.lookup(&key).await {
            tracing::debug!(page_id = query.page_id, "page cache hit");
            return Ok(body);
        }

        tracing::debug!(page_id = query.page_id, "page cache miss");
        let body = self.inner.fetch_page(query).await?;

        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(key, CacheEntry { body: body.clone(), expires_at });

        Ok(body)
    }
}
