//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use harvest_core::RunStatus;
use harvest_engine::ExtractionOutcome;
use harvest_store::{CheckpointSummary, MetadataEntry, RegistrySummary};
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// Result of one `run`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub endpoint: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_extraction: Option<DateTime<Utc>>,
    pub total_records: u64,
    pub total_pages: u32,
    pub failed_pages: u32,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from_page: Option<u32>,
    pub duration_seconds: f64,
    pub is_complete: bool,
    pub completeness_notes: Vec<String>,
}

impl RunOutput {
    /// Flattens an engine outcome.
    pub fn new(endpoint: &str, outcome: &ExtractionOutcome) -> Self {
        match outcome {
            ExtractionOutcome::Completed { stats, entry } => Self {
                endpoint: endpoint.to_string(),
                skipped: false,
                last_extraction: entry.last_extraction,
                total_records: stats.total_records,
                total_pages: stats.total_pages,
                failed_pages: stats.failed_pages,
                used_fallback: stats.used_fallback,
                resumed_from_page: stats.resumed_from_page,
                duration_seconds: stats.duration_seconds(),
                is_complete: entry.is_complete,
                completeness_notes: entry.completeness_notes.clone(),
            },
            ExtractionOutcome::Skipped { last_extraction } => Self {
                endpoint: endpoint.to_string(),
                skipped: true,
                last_extraction: *last_extraction,
                total_records: 0,
                total_pages: 0,
                failed_pages: 0,
                used_fallback: false,
                resumed_from_page: None,
                duration_seconds: 0.0,
                is_complete: true,
                completeness_notes: Vec::new(),
            },
        }
    }
}

/// One registry entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOutput {
    pub name: String,
    pub category: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_extraction: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_extraction: Option<DateTime<Utc>>,
    pub total_records: u64,
    pub is_complete: bool,
    pub completeness_notes: Vec<String>,
    pub runs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EndpointOutput {
    /// Summarises `entry`.
    pub fn new(name: &str, entry: &MetadataEntry) -> Self {
        let last = entry.extraction_history.back();
        Self {
            name: name.to_string(),
            category: entry.category.clone(),
            filename: entry.filename.clone(),
            last_extraction: entry.last_extraction,
            last_successful_extraction: entry.last_successful_extraction,
            total_records: entry.total_records,
            is_complete: entry.is_complete,
            completeness_notes: entry.completeness_notes.clone(),
            runs: entry.extraction_history.len(),
            last_status: last.map(|run| run.status),
            last_error: last.and_then(|run| run.error.clone()),
        }
    }
}

/// Registry overview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub registry: String,
    pub summary: RegistrySummary,
    pub endpoints: Vec<EndpointOutput>,
}

/// A titled list of endpoint names.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamesOutput {
    #[serde(skip)]
    pub title: String,
    pub names: Vec<String>,
}

/// Checkpoint listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointsOutput {
    pub dir: String,
    pub checkpoints: Vec<CheckpointSummary>,
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
