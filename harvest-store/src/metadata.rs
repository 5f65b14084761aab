//! Extraction metadata registry.
//!
//! Keeps one [`MetadataEntry`] per logical endpoint in a single JSON file,
//! read fully on open and rewritten fully on every save. Besides the audit
//! trail it answers whether an endpoint's last data is complete and fresh
//! enough to skip re-extraction.

use chrono::{DateTime, Duration, Utc};
use harvest_core::{Clock, ExtractionStats, RunStatus, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{load_json_opt, save_json};

/// Registry file format version.
pub const REGISTRY_VERSION: &str = "1.0.0";

/// Runs kept per endpoint.
pub const MAX_HISTORY_ENTRIES: usize = 10;

// ============================================================================
// Registry Types
// ============================================================================

/// One run in an endpoint's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// When the run was recorded.
    pub timestamp: DateTime<Utc>,
    /// Run start.
    pub start_time: DateTime<Utc>,
    /// Run end.
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration.
    pub duration_seconds: f64,
    /// Records written.
    pub total_records: u64,
    /// Pages fetched.
    pub total_pages: u32,
    /// Pages that failed.
    pub failed_pages: u32,
    /// Whether the run is believed complete.
    pub is_complete: bool,
    /// Why the run is not complete.
    pub completeness_notes: Vec<String>,
    /// Final status.
    pub status: RunStatus,
    /// Error message for failed runs.
    pub error: Option<String>,
    /// Whether the paginated fallback was used.
    #[serde(default)]
    pub used_fallback: bool,
}

/// Extraction state of one logical endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Data category.
    pub category: String,
    /// Output file name.
    pub filename: String,
    /// Most recent runs, oldest first.
    pub extraction_history: VecDeque<ExtractionRecord>,
    /// When the latest run was recorded.
    pub last_extraction: Option<DateTime<Utc>>,
    /// When the latest successful run was recorded.
    pub last_successful_extraction: Option<DateTime<Utc>>,
    /// Records in the latest successful run.
    pub total_records: u64,
    /// Completeness of the latest run.
    pub is_complete: bool,
    /// Notes explaining the latest run's completeness.
    #[serde(default)]
    pub completeness_notes: Vec<String>,
}

impl MetadataEntry {
    fn new(category: &str, filename: &str) -> Self {
        Self {
            category: category.to_string(),
            filename: filename.to_string(),
            extraction_history: VecDeque::new(),
            last_extraction: None,
            last_successful_extraction: None,
            total_records: 0,
            is_complete: false,
            completeness_notes: Vec::new(),
        }
    }

    /// The most recent successful run still in history.
    pub fn latest_success(&self) -> Option<&ExtractionRecord> {
        self.extraction_history
            .iter()
            .rev()
            .find(|record| record.status.is_success())
    }
}

/// On-disk registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Format version.
    pub version: String,
    /// When the registry was created.
    pub created_at: DateTime<Utc>,
    /// When the registry was last written.
    pub last_updated: DateTime<Utc>,
    /// Entries by endpoint name.
    pub endpoints: BTreeMap<String, MetadataEntry>,
}

impl RegistryDocument {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            created_at: now,
            last_updated: now,
            endpoints: BTreeMap::new(),
        }
    }
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    /// Endpoints tracked.
    pub total_endpoints: usize,
    /// Endpoints whose latest run is complete.
    pub complete_endpoints: usize,
    /// Endpoints whose latest run is incomplete.
    pub incomplete_endpoints: usize,
    /// Sum of records over the latest successful runs.
    pub total_records: u64,
}

// ============================================================================
// Completeness
// ============================================================================

/// Completeness verdict for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    /// Whether the run is believed complete.
    pub is_complete: bool,
    /// Reasons it is not.
    pub notes: Vec<String>,
}

/// Judges whether a run retrieved the whole dataset.
///
/// A single page holding exactly `page_size_limit` records is likely a
/// silently truncated response; any failed page means records are missing.
pub fn assess_completeness(stats: &ExtractionStats, page_size_limit: u32) -> Completeness {
    let mut notes = Vec::new();

    if stats.status == RunStatus::Error {
        notes.push(format!(
            "Extraction failed: {}",
            stats.error.as_deref().unwrap_or("unknown error")
        ));
    }

    if stats.total_pages == 1
        && page_size_limit > 0
        && stats.total_records == u64::from(page_size_limit)
    {
        notes.push(format!(
            "Possible truncation: single page returned exactly {page_size_limit} records (the page size limit)"
        ));
    }

    if stats.failed_pages > 0 {
        notes.push(format!(
            "{} page(s) failed to fetch; dataset is missing records",
            stats.failed_pages
        ));
    }

    Completeness {
        is_complete: notes.is_empty(),
        notes,
    }
}

fn hours(max_age_hours: f64) -> Duration {
    #[allow(clippy::cast_possible_truncation)]
    Duration::milliseconds((max_age_hours * 3_600_000.0) as i64)
}

// ============================================================================
// Metadata Registry
// ============================================================================

/// File-backed registry of extraction history per endpoint.
#[derive(Debug)]
pub struct MetadataRegistry {
    path: PathBuf,
    page_size_limit: u32,
    clock: Arc<dyn Clock>,
    inner: RwLock<RegistryDocument>,
}

impl MetadataRegistry {
    /// Opens the registry at `path`, starting empty if the file is absent.
    ///
    /// `page_size_limit` is the fallback page size used by the truncation
    /// heuristic.
    pub async fn open(path: impl Into<PathBuf>, page_size_limit: u32) -> Result<Self, StoreError> {
        Self::open_with_clock(path, page_size_limit, Arc::new(SystemClock)).await
    }

    /// Opens the registry with an explicit clock.
    pub async fn open_with_clock(
        path: impl Into<PathBuf>,
        page_size_limit: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let document = match load_json_opt::<RegistryDocument>(&path).await? {
            Some(document) => {
                if document.version != REGISTRY_VERSION {
                    warn!(
                        path = %path.display(),
                        version = %document.version,
                        "Registry written by a different version"
                    );
                }
                debug!(
                    path = %path.display(),
                    endpoints = document.endpoints.len(),
                    "Loaded metadata registry"
                );
                document
            }
            None => {
                debug!(path = %path.display(), "No registry file, starting empty");
                RegistryDocument::empty(clock.now())
            }
        };

        Ok(Self {
            path,
            page_size_limit,
            clock,
            inner: RwLock::new(document),
        })
    }

    /// Registry file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page size used by the truncation heuristic.
    pub fn page_size_limit(&self) -> u32 {
        self.page_size_limit
    }

    /// Writes the whole registry to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let mut document = self.inner.write().await;
        document.last_updated = self.clock.now();
        save_json(&self.path, &*document).await
    }

    /// Records a finished run for `endpoint_name` and persists the registry.
    ///
    /// Returns the updated entry. When the write fails the registry is left
    /// as it was.
    pub async fn update_extraction(
        &self,
        endpoint_name: &str,
        stats: &ExtractionStats,
        category: &str,
        filename: &str,
    ) -> Result<MetadataEntry, StoreError> {
        let now = self.clock.now();
        let completeness = assess_completeness(stats, self.page_size_limit);

        if !completeness.is_complete {
            for note in &completeness.notes {
                warn!(endpoint = endpoint_name, note = %note, "Extraction incomplete");
            }
        }

        let record = ExtractionRecord {
            timestamp: now,
            start_time: stats.start_time,
            end_time: stats.end_time,
            duration_seconds: stats.duration_seconds(),
            total_records: stats.total_records,
            total_pages: stats.total_pages,
            failed_pages: stats.failed_pages,
            is_complete: completeness.is_complete,
            completeness_notes: completeness.notes.clone(),
            status: stats.status,
            error: stats.error.clone(),
            used_fallback: stats.used_fallback,
        };

        // Staged on a copy; memory only changes once the write succeeds.
        let entry = {
            let mut document = self.inner.write().await;
            let mut staged = document.clone();
            let entry = staged
                .endpoints
                .entry(endpoint_name.to_string())
                .or_insert_with(|| MetadataEntry::new(category, filename));

            entry.category = category.to_string();
            entry.filename = filename.to_string();
            entry.extraction_history.push_back(record);
            while entry.extraction_history.len() > MAX_HISTORY_ENTRIES {
                entry.extraction_history.pop_front();
            }

            entry.last_extraction = Some(now);
            if stats.status.is_success() {
                entry.last_successful_extraction = Some(now);
                entry.total_records = stats.total_records;
            }
            entry.is_complete = completeness.is_complete;
            entry.completeness_notes = completeness.notes;
            let entry = entry.clone();

            staged.last_updated = now;
            save_json(&self.path, &staged).await?;
            *document = staged;
            entry
        };

        info!(
            endpoint = endpoint_name,
            status = %stats.status,
            records = stats.total_records,
            complete = entry.is_complete,
            "Recorded extraction"
        );
        Ok(entry)
    }

    /// Decides whether `endpoint_name` can skip a full re-extraction.
    ///
    /// Answers `true` only when the most recent successful run is complete
    /// and younger than `max_age_hours`. The second value is the time of
    /// the last successful extraction, when there was one.
    pub async fn should_extract_incremental(
        &self,
        endpoint_name: &str,
        max_age_hours: f64,
    ) -> (bool, Option<DateTime<Utc>>) {
        let document = self.inner.read().await;
        let Some(entry) = document.endpoints.get(endpoint_name) else {
            debug!(endpoint = endpoint_name, "No prior extraction");
            return (false, None);
        };

        let last = entry.last_successful_extraction;
        let Some(success) = entry.latest_success() else {
            return (false, last);
        };

        if !success.is_complete {
            debug!(endpoint = endpoint_name, "Last successful run was incomplete");
            return (false, last);
        }

        let age = self.clock.now() - success.timestamp;
        let fresh = age < hours(max_age_hours);
        debug!(
            endpoint = endpoint_name,
            age_minutes = age.num_minutes(),
            fresh,
            "Checked freshness"
        );
        (fresh, last)
    }

    /// Returns a copy of the entry for `endpoint_name`.
    pub async fn get_endpoint(&self, endpoint_name: &str) -> Option<MetadataEntry> {
        self.inner.read().await.endpoints.get(endpoint_name).cloned()
    }

    /// Names of all tracked endpoints, sorted.
    pub async fn endpoint_names(&self) -> Vec<String> {
        self.inner.read().await.endpoints.keys().cloned().collect()
    }

    /// Endpoints whose latest run is incomplete.
    pub async fn get_incomplete_endpoints(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .endpoints
            .iter()
            .filter(|(_, entry)| !entry.is_complete)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Endpoints never successfully extracted or last extracted longer than
    /// `max_age_hours` ago.
    pub async fn get_stale_endpoints(&self, max_age_hours: f64) -> Vec<String> {
        let cutoff = self.clock.now() - hours(max_age_hours);
        self.inner
            .read()
            .await
            .endpoints
            .iter()
            .filter(|(_, entry)| {
                entry
                    .last_successful_extraction
                    .is_none_or(|last| last < cutoff)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Aggregate counts over all endpoints.
    pub async fn summary(&self) -> RegistrySummary {
        let document = self.inner.read().await;
        let total_endpoints = document.endpoints.len();
        let complete_endpoints = document.endpoints.values().filter(|e| e.is_complete).count();

        RegistrySummary {
            total_endpoints,
            complete_endpoints,
            incomplete_endpoints: total_endpoints - complete_endpoints,
            total_records: document.endpoints.values().map(|e| e.total_records).sum(),
        }
    }

    /// Drops every entry and rewrites the file.
    pub async fn reset(&self) -> Result<(), StoreError> {
        {
            let mut document = self.inner.write().await;
            *document = RegistryDocument::empty(self.clock.now());
        }
        self.save().await?;
        info!(path = %self.path.display(), "Metadata registry reset");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
