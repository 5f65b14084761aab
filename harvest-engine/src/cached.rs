//! Response-caching source decorator.

use async_trait::async_trait;
use harvest_core::{Clock, PageResponse};
use harvest_fetch::{FetchError, QueryParams, Source};
use harvest_store::TtlCache;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type PageKey = (u32, u32, QueryParams);

/// Memoises successful page responses of an inner [`Source`].
///
/// Errors are never cached, so a retried or resumed run within the same
/// process only re-requests pages that failed or expired.
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<TtlCache<PageKey, PageResponse>>,
}

impl<S: Source> CachedSource<S> {
    /// Wraps `inner`, keeping up to `capacity` pages for `ttl` each.
    pub fn new(inner: S, ttl: chrono::Duration, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(TtlCache::new(ttl, capacity)),
        }
    }

    /// Replaces the cache clock.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        let cache = self
            .cache
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .with_clock(clock);
        Self {
            inner: self.inner,
            cache: Mutex::new(cache),
        }
    }

    /// The wrapped source.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached pages, expired ones included.
    pub fn cached_pages(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TtlCache<PageKey, PageResponse>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: Source> Source for CachedSource<S> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn validate(&self) -> Result<(), FetchError> {
        self.inner.validate().await
    }

    async fn fetch(
        &self,
        page: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> Result<PageResponse, FetchError> {
        let key = (page, page_size, params.clone());
        let cached = self.lock().get(&key);
        if let Some(hit) = cached {
            debug!(source = self.inner.id(), page, "Page served from cache");
            return Ok(hit);
        }

        let response = self.inner.fetch(page, page_size, params).await?;
        self.lock().insert(key, response.clone());
        Ok(response)
    }
}
