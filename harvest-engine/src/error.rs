//! Engine error types.

use harvest_core::PageMetadata;
use harvest_fetch::FetchError;
use harvest_store::StoreError;
use thiserror::Error;

/// Errors that end an extraction run.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Settings or source parameters make the run impossible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bulk request returned a partial dataset.
    #[error("Bulk fetch returned {records} records but reported more pages")]
    IncompleteBulkFetch {
        /// Records in the rejected response.
        records: usize,
        /// Metadata the source reported with it.
        metadata: PageMetadata,
    },

    /// A request failed in a way that cannot be absorbed.
    #[error("Source error: {0}")]
    Source(#[from] FetchError),

    /// Checkpoint, registry or sink failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ExtractionError {
    /// Returns true if the source broke the bulk fetch contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::IncompleteBulkFetch { .. })
    }

    /// Returns true if the run failed before doing any work.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
