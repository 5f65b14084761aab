//! Page and record models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A single extracted record.
///
/// Records are schemaless: the engine only cares that each one is a JSON
/// object, never about the fields inside it.
pub type Record = serde_json::Map<String, Value>;

// ============================================================================
// Page Metadata
// ============================================================================

/// Paging information reported alongside a page of records.
///
/// Every field is optional because sources report paging inconsistently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMetadata {
    /// Page number this response answers (1-based).
    pub page: Option<u32>,
    /// Page size the source applied.
    pub page_size: Option<u32>,
    /// Total number of records across all pages.
    pub total_count: Option<u64>,
    /// Whether the source says more pages follow.
    pub has_more_pages: bool,
}

impl PageMetadata {
    /// Returns the total record count if the source reported a positive one.
    pub fn known_total(&self) -> Option<u64> {
        self.total_count.filter(|&total| total > 0)
    }

    /// Number of pages needed to cover the known total at `page_size`.
    pub fn total_pages(&self, page_size: u32) -> Option<u32> {
        if page_size == 0 {
            return None;
        }
        self.known_total()
            .map(|total| total.div_ceil(u64::from(page_size)))
            .map(|pages| u32::try_from(pages).unwrap_or(u32::MAX))
    }
}

// ============================================================================
// Page Response
// ============================================================================

/// One response from a paginated source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResponse {
    /// Records in arrival order.
    pub records: Vec<Record>,
    /// Paging metadata, absent when the source did not report any.
    pub metadata: Option<PageMetadata>,
}

impl PageResponse {
    /// Creates a response without metadata.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            metadata: None,
        }
    }

    /// Attaches a metadata block.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Number of records in this page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the page carried no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if the metadata says more pages follow.
    pub fn has_more_pages(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.has_more_pages)
    }

    /// Known total record count, if reported.
    pub fn known_total(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(PageMetadata::known_total)
    }

    /// Decodes a response body.
    ///
    /// Accepts either a bare array of records, or an object holding the
    /// records under `records` (or `data`) plus an optional `metadata`
    /// object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Array(items) => Ok(Self::new(into_records(items)?)),
            Value::Object(mut body) => {
                let items = match body.remove("records").or_else(|| body.remove("data")) {
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        return Err(CoreError::InvalidData(format!(
                            "records must be an array, got {}",
                            type_name(&other)
                        )));
                    }
                    None => {
                        return Err(CoreError::InvalidData(
                            "response has no records array".to_string(),
                        ));
                    }
                };

                let metadata = match body.remove("metadata") {
                    None | Some(Value::Null) => None,
                    Some(raw) => Some(serde_json::from_value(raw)?),
                };

                Ok(Self {
                    records: into_records(items)?,
                    metadata,
                })
            }
            other => Err(CoreError::InvalidData(format!(
                "expected an object or array, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn into_records(items: Vec<Value>) -> Result<Vec<Record>, CoreError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(CoreError::InvalidData(format!(
                "record {index} is {}, not an object",
                type_name(&other)
            ))),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
