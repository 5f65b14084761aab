//! Extraction strategies.
//!
//! A run tries [`StrategyKind::Bulk`] first (unless disabled or resuming)
//! and falls back to [`StrategyKind::Paginated`] when the bulk request
//! fails with an error that permits it.

use harvest_fetch::FetchError;
use std::fmt;

/// How records are pulled from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// One request for every record.
    Bulk,
    /// Page by page with a bounded page size.
    Paginated,
}

impl StrategyKind {
    /// Label used for attempt snapshots and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Paginated => "paginated",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a failed bulk request should hand over to pagination.
///
/// Fatal errors (credentials, bad URL) would fail pagination the same way.
pub fn should_fallback(error: &FetchError) -> bool {
    !error.is_fatal()
}

/// How the paginated strategy decides where to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// The source reported a total; fetch exactly this many pages.
    KnownTotal(u32),
    /// Fetch until a short or empty page.
    UnknownTotal,
}

impl PageMode {
    /// Picks the mode from a page total, if any.
    pub fn from_total(total_pages: Option<u32>) -> Self {
        total_pages.map_or(Self::UnknownTotal, Self::KnownTotal)
    }
}
