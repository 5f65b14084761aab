//! Wire-format tests for core models.

use chrono::{TimeZone, Utc};
use serde_json::json;

use super::{ExtractionStats, PageMetadata, RunStatus};

#[test]
fn test_run_status_serializes_lowercase() {
    assert_eq!(serde_json::to_value(RunStatus::Success).unwrap(), json!("success"));
    assert_eq!(serde_json::to_value(RunStatus::Error).unwrap(), json!("error"));
}

#[test]
fn test_metadata_missing_fields_default() {
    let meta: PageMetadata = serde_json::from_value(json!({})).unwrap();
    assert_eq!(meta, PageMetadata::default());
}

#[test]
fn test_stats_timestamps_are_rfc3339() {
    let start = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let stats = ExtractionStats::new(start);
    let value = serde_json::to_value(&stats).unwrap();

    assert_eq!(value["start_time"], json!("2024-05-06T07:08:09Z"));
    assert_eq!(value["end_time"], json!(null));
    assert_eq!(value["status"], json!("success"));
}
