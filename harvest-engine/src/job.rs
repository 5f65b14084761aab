//! Extraction jobs and outcomes.

use chrono::{DateTime, Utc};
use harvest_core::ExtractionStats;
use harvest_fetch::QueryParams;
use harvest_store::MetadataEntry;

/// Variant used when a job does not name one.
pub const DEFAULT_VARIANT: &str = "all";

/// What to extract and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    /// Logical endpoint name, the metadata registry key.
    pub endpoint: String,
    /// Distinguishes extractions of one endpoint with different parameters.
    pub variant: String,
    /// Data category recorded in the registry.
    pub category: String,
    /// Sink destination.
    pub output_name: String,
    /// Extra parameters forwarded with every request.
    pub params: QueryParams,
    /// Run even if the last extraction is complete and fresh.
    pub force: bool,
    /// Try a single bulk request before paginating.
    pub bulk: bool,
}

impl ExtractionJob {
    /// Creates a job for `endpoint` writing to `output_name`.
    pub fn new(
        endpoint: impl Into<String>,
        category: impl Into<String>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            variant: DEFAULT_VARIANT.to_string(),
            category: category.into(),
            output_name: output_name.into(),
            params: QueryParams::new(),
            force: false,
            bulk: true,
        }
    }

    /// Sets the variant.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Adds a request parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces all request parameters.
    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Skips the freshness check.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enables or disables the bulk attempt.
    #[must_use]
    pub fn with_bulk(mut self, bulk: bool) -> Self {
        self.bulk = bulk;
        self
    }

    /// Checkpoint key, `"{endpoint}_{variant}"`.
    pub fn extraction_id(&self) -> String {
        format!("{}_{}", self.endpoint, self.variant)
    }
}

/// Result of [`ExtractionEngine::run`](crate::ExtractionEngine::run).
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// The run went through; completeness is in the entry.
    Completed {
        /// Run statistics.
        stats: ExtractionStats,
        /// Registry entry after the run was recorded.
        entry: MetadataEntry,
    },
    /// The last extraction was complete and fresh, nothing was requested.
    Skipped {
        /// When the last successful extraction was recorded.
        last_extraction: Option<DateTime<Utc>>,
    },
}

impl ExtractionOutcome {
    /// Stats of a completed run.
    pub fn stats(&self) -> Option<&ExtractionStats> {
        match self {
            Self::Completed { stats, .. } => Some(stats),
            Self::Skipped { .. } => None,
        }
    }

    /// Returns true if the run was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns true if the run completed and retrieved the full dataset.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { entry, .. } if entry.is_complete)
    }
}
