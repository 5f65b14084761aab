//! Extraction run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::page::PageMetadata;

// ============================================================================
// Run Status
// ============================================================================

/// Final status of an extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run reached completion (possibly with failed pages).
    #[default]
    Success,
    /// The run aborted with an error.
    Error,
}

impl RunStatus {
    /// Returns true for [`RunStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Attempt Snapshot
// ============================================================================

/// Paging metadata observed by one fetch attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    /// Page the source reported.
    pub page: Option<u32>,
    /// Page size the source reported.
    pub page_size: Option<u32>,
    /// Total count the source reported.
    pub total_count: Option<u64>,
    /// Whether the source said more pages follow.
    pub has_more_pages: bool,
}

impl From<&PageMetadata> for AttemptSnapshot {
    fn from(meta: &PageMetadata) -> Self {
        Self {
            page: meta.page,
            page_size: meta.page_size,
            total_count: meta.total_count,
            has_more_pages: meta.has_more_pages,
        }
    }
}

// ============================================================================
// Extraction Stats
// ============================================================================

/// Counters and timings for a single extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Records written to the sink.
    pub total_records: u64,
    /// Pages fetched successfully.
    pub total_pages: u32,
    /// Pages whose fetch failed after retries.
    pub failed_pages: u32,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run ended.
    pub end_time: Option<DateTime<Utc>>,
    /// Whether the paginated fallback was used.
    pub used_fallback: bool,
    /// Page the run resumed after, when it continued from a checkpoint.
    pub resumed_from_page: Option<u32>,
    /// Metadata snapshots keyed by attempt label (`bulk`, `page_1`, ...).
    pub attempts: BTreeMap<String, AttemptSnapshot>,
    /// Final status.
    pub status: RunStatus,
    /// Error message for failed runs.
    pub error: Option<String>,
}

impl ExtractionStats {
    /// Creates empty stats for a run starting at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            total_records: 0,
            total_pages: 0,
            failed_pages: 0,
            start_time,
            end_time: None,
            used_fallback: false,
            resumed_from_page: None,
            attempts: BTreeMap::new(),
            status: RunStatus::Success,
            error: None,
        }
    }

    /// Records the metadata an attempt observed.
    pub fn record_attempt(&mut self, label: impl Into<String>, metadata: &PageMetadata) {
        self.attempts
            .insert(label.into(), AttemptSnapshot::from(metadata));
    }

    /// Marks the run as finished successfully.
    pub fn finish(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.status = RunStatus::Success;
        self.error = None;
    }

    /// Marks the run as failed.
    pub fn fail(&mut self, end_time: DateTime<Utc>, error: impl Into<String>) {
        self.end_time = Some(end_time);
        self.status = RunStatus::Error;
        self.error = Some(error.into());
    }

    /// Run duration in seconds, zero while the run is still open.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_duration_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut stats = ExtractionStats::new(start);
        assert!((stats.duration_seconds() - 0.0).abs() < f64::EPSILON);

        stats.finish(start + Duration::milliseconds(2500));
        assert!((stats.duration_seconds() - 2.5).abs() < f64::EPSILON);
        assert!(stats.status.is_success());
    }

    #[test]
    fn test_fail_records_error() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut stats = ExtractionStats::new(start);
        stats.fail(start, "boom");

        assert_eq!(stats.status, RunStatus::Error);
        assert_eq!(stats.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_record_attempt_overwrites_label() {
        let mut stats = ExtractionStats::new(Utc::now());
        stats.record_attempt(
            "page_1",
            &PageMetadata {
                page: Some(1),
                ..Default::default()
            },
        );
        stats.record_attempt(
            "page_1",
            &PageMetadata {
                page: Some(1),
                total_count: Some(30),
                ..Default::default()
            },
        );

        assert_eq!(stats.attempts.len(), 1);
        assert_eq!(stats.attempts["page_1"].total_count, Some(30));
    }
}
