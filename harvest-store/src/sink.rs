//! Batch sinks.
//!
//! The engine hands finished batches to a [`Sink`]. The first batch of a
//! fresh run is written with `append == false` (replace the destination);
//! every later batch, and every batch of a resumed run, appends.

use async_trait::async_trait;
use harvest_core::Record;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;
use crate::persistence::{ensure_dir, safe_file_stem};

/// Durable destination for record batches.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Writes one batch to `destination`, replacing it unless `append`.
    async fn write_batch(
        &self,
        records: &[Record],
        destination: &str,
        append: bool,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// JSON Lines Sink
// ============================================================================

/// Writes each destination as `<dir>/<destination>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    /// Creates a sink writing under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File path for `destination`.
    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", safe_file_stem(destination)))
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn write_batch(
        &self,
        records: &[Record],
        destination: &str,
        append: bool,
    ) -> Result<(), StoreError> {
        ensure_dir(&self.dir).await?;
        let path = self.path_for(destination);

        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        debug!(
            path = %path.display(),
            records = records.len(),
            append,
            "Batch written"
        );
        Ok(())
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// One batch as received by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBatch {
    /// Destination name.
    pub destination: String,
    /// Whether the batch appended.
    pub append: bool,
    /// Records in the batch.
    pub records: Vec<Record>,
}

/// Keeps every batch in memory. For dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<WrittenBatch>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches in arrival order.
    pub fn batches(&self) -> Vec<WrittenBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current contents of each destination, honouring overwrite semantics.
    pub fn contents(&self) -> BTreeMap<String, Vec<Record>> {
        let mut contents: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for batch in self.batches() {
            let records = contents.entry(batch.destination).or_default();
            if !batch.append {
                records.clear();
            }
            records.extend(batch.records);
        }
        contents
    }

    /// Current contents of one destination.
    pub fn records(&self, destination: &str) -> Vec<Record> {
        self.contents().remove(destination).unwrap_or_default()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write_batch(
        &self,
        records: &[Record],
        destination: &str,
        append: bool,
    ) -> Result<(), StoreError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WrittenBatch {
                destination: destination.to_string(),
                append,
                records: records.to_vec(),
            });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
