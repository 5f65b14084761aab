//! Checkpoint store.
//!
//! One JSON file per extraction id under the checkpoint directory. A file
//! exists exactly while its extraction has unresumed progress: the engine
//! saves after every page and clears only after the run's metadata has
//! been recorded.
//!
//! There is no locking. One process owns a given extraction id at a time.

use chrono::{DateTime, Utc};
use harvest_core::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{load_json_opt, remove_file, safe_file_stem, save_json};

/// Field holding the save time.
pub const TIMESTAMP_FIELD: &str = "_timestamp";
/// Field holding the extraction id.
pub const EXTRACTION_ID_FIELD: &str = "_extraction_id";

/// Free-form checkpoint contents as handed to [`CheckpointStore::save`].
pub type CheckpointState = Map<String, Value>;

// ============================================================================
// Typed Views
// ============================================================================

/// A loaded checkpoint with its well-known fields pulled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Extraction this checkpoint belongs to.
    #[serde(rename = "_extraction_id")]
    pub extraction_id: String,
    /// Last page fully processed.
    #[serde(default)]
    pub last_page: u32,
    /// Records written so far.
    #[serde(default)]
    pub total_records: u64,
    /// When the checkpoint was saved.
    #[serde(rename = "_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Caller-defined progress fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Checkpoint {
    /// Reads a caller-defined unsigned integer field.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    /// Reads a caller-defined `u32` field.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_u64(key).and_then(|v| u32::try_from(v).ok())
    }

    /// Reads a caller-defined string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Summary line for [`CheckpointStore::list_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    /// Extraction id.
    pub extraction_id: String,
    /// Last page fully processed.
    pub last_page: u32,
    /// Records written so far.
    pub total_records: u64,
    /// When the checkpoint was saved.
    pub timestamp: DateTime<Utc>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            extraction_id: checkpoint.extraction_id.clone(),
            last_page: checkpoint.last_page,
            total_records: checkpoint.total_records,
            timestamp: checkpoint.timestamp,
        }
    }
}

// ============================================================================
// Checkpoint Store
// ============================================================================

/// File-backed store of per-extraction progress.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CheckpointStore {
    /// Creates a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for `_timestamp`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory holding the checkpoint files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for an extraction id.
    pub fn path_for(&self, extraction_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(extraction_id)))
    }

    /// Saves `state`, replacing whatever was stored for `extraction_id`.
    pub async fn save(&self, extraction_id: &str, mut state: CheckpointState) -> Result<(), StoreError> {
        state.insert(
            TIMESTAMP_FIELD.to_string(),
            serde_json::to_value(self.clock.now())?,
        );
        state.insert(
            EXTRACTION_ID_FIELD.to_string(),
            Value::String(extraction_id.to_string()),
        );

        save_json(&self.path_for(extraction_id), &state).await?;
        debug!(extraction_id, "Checkpoint saved");
        Ok(())
    }

    /// Loads the raw state saved for `extraction_id`, if any.
    pub async fn load(&self, extraction_id: &str) -> Result<Option<CheckpointState>, StoreError> {
        let state = load_json_opt(&self.path_for(extraction_id)).await?;
        if state.is_some() {
            debug!(extraction_id, "Checkpoint loaded");
        }
        Ok(state)
    }

    /// Loads the typed checkpoint for `extraction_id`, if any.
    ///
    /// A file whose `_extraction_id` names another extraction is ignored.
    pub async fn load_checkpoint(&self, extraction_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.path_for(extraction_id);
        let Some(state) = self.load(extraction_id).await? else {
            return Ok(None);
        };

        let checkpoint = parse_checkpoint(&path, state)?;
        if checkpoint.extraction_id != extraction_id {
            warn!(
                extraction_id,
                stored = %checkpoint.extraction_id,
                path = %path.display(),
                "Checkpoint belongs to another extraction, ignoring"
            );
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }

    /// Removes the checkpoint; returns whether one existed.
    pub async fn clear(&self, extraction_id: &str) -> Result<bool, StoreError> {
        let existed = remove_file(&self.path_for(extraction_id)).await?;
        if existed {
            info!(extraction_id, "Checkpoint cleared");
        }
        Ok(existed)
    }

    /// Returns true if a checkpoint exists for `extraction_id`.
    pub async fn exists(&self, extraction_id: &str) -> bool {
        tokio::fs::try_exists(self.path_for(extraction_id))
            .await
            .unwrap_or(false)
    }

    /// Summaries of every stored checkpoint, sorted by extraction id.
    ///
    /// Unreadable files are skipped with a warning.
    pub async fn list_all(&self) -> Result<Vec<CheckpointSummary>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let loaded = match load_json_opt::<CheckpointState>(&path).await {
                Ok(Some(state)) => parse_checkpoint(&path, state),
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            match loaded {
                Ok(checkpoint) => summaries.push(CheckpointSummary::from(&checkpoint)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }

        summaries.sort_by(|a, b| a.extraction_id.cmp(&b.extraction_id));
        Ok(summaries)
    }
}

fn parse_checkpoint(path: &Path, state: CheckpointState) -> Result<Checkpoint, StoreError> {
    serde_json::from_value(Value::Object(state)).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
