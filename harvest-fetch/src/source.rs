//! Paginated source trait.
//!
//! A source answers page requests with a [`PageResponse`]. Authentication,
//! transport and response decoding are the source's business; the engine
//! only sees records and paging metadata.

use async_trait::async_trait;
use harvest_core::PageResponse;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::FetchError;

/// Page-size sentinel asking the source for every record in one response.
pub const BULK_PAGE_SIZE: u32 = 0;

/// Extra query parameters forwarded with every page request.
pub type QueryParams = BTreeMap<String, String>;

/// A remote data source that serves records page by page.
///
/// ## Implementing a Source
///
/// ```ignore
/// struct FixtureSource;
///
/// #[async_trait]
/// impl Source for FixtureSource {
///     fn id(&self) -> &str {
///         "fixture"
///     }
///
///     async fn fetch(
///         &self,
///         page: u32,
///         page_size: u32,
///         params: &QueryParams,
///     ) -> Result<PageResponse, FetchError> {
///         Ok(PageResponse::new(Vec::new()))
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier stamped onto every record as `_source`.
    fn id(&self) -> &str;

    /// Checks that the source is usable (credentials present, URL valid).
    ///
    /// Called once before any request; an error here aborts the run.
    async fn validate(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Fetches one page.
    ///
    /// `page` is 1-based. A `page_size` of [`BULK_PAGE_SIZE`] asks for all
    /// records in a single response.
    async fn fetch(
        &self,
        page: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> Result<PageResponse, FetchError>;
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn validate(&self) -> Result<(), FetchError> {
        (**self).validate().await
    }

    async fn fetch(
        &self,
        page: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> Result<PageResponse, FetchError> {
        (**self).fetch(page, page_size, params).await
    }
}
