//! Read-through cache for fetched documents.
//!
//! Keyed by the URL a document was fetched from (after any PDF rewrite).
//! Uses [`moka`] for async-friendly caching with a TTL and automatic
//! eviction. Failed fetches are never cached.

use std::time::Duration;

use moka::future::Cache;

use crate::types::{FetchStatus, FetchedDocument};

/// Maximum number of cached documents.
const MAX_CACHE_ENTRIES: u64 = 500;

/// Process-local document cache shared by one fetcher.
#[derive(Clone)]
pub struct DocumentCache {
    inner: Cache<String, FetchedDocument>,
}

impl DocumentCache {
    /// Build a cache whose entries expire after `ttl_seconds`.
    ///
    /// Returns `None` when `ttl_seconds` is 0 (caching disabled).
    pub fn new(ttl_seconds: u64) -> Option<Self> {
        if ttl_seconds == 0 {
            return None;
        }
        let inner = Cache::builder()
            .max_capacity(MAX_CACHE_ENTRIES)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();
        Some(Self { inner })
    }

    /// Look up the document fetched from `target`.
    pub async fn get(&self, target: &str) -> Option<FetchedDocument> {
        self.inner.get(target).await
    }

    /// Remember `document` as the result of fetching `target`.
    pub async fn insert(&self, target: &str, document: &FetchedDocument) {
        if matches!(document.fetch_status, FetchStatus::FetchFailed(_)) {
            return;
        }
        self.inner.insert(target.to_owned(), document.clone()).await;
    }
}
