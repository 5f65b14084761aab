//! In-flight run state.
//!
//! An [`ExtractionRun`] buffers records between sink flushes and tracks
//! which pages are safely on disk. Only those are reported in checkpoints,
//! so a resumed run re-fetches anything that was still buffered.

use chrono::{DateTime, Utc};
use harvest_core::{ExtractionStats, Record};
use harvest_store::{Checkpoint, CheckpointState};
use serde_json::json;

use crate::job::ExtractionJob;

/// Checkpoint field holding the page size in use.
pub const PAGE_SIZE_FIELD: &str = "page_size";
/// Checkpoint field holding the failed page count.
pub const FAILED_PAGES_FIELD: &str = "failed_pages";
/// Checkpoint field holding the known page total.
pub const TOTAL_PAGES_FIELD: &str = "total_pages";

/// Mutable state of one `run()` call.
#[derive(Debug)]
pub struct ExtractionRun {
    /// Checkpoint key.
    pub extraction_id: String,
    /// Data category.
    pub category: String,
    /// Sink destination.
    pub output_name: String,
    /// Page size of the paginated strategy.
    pub page_size: u32,
    /// Page total, when the source reported one.
    pub known_total_pages: Option<u32>,
    /// Statistics folded into the registry at the end.
    pub stats: ExtractionStats,
    buffer: Vec<(u32, Record)>,
    last_page: u32,
    flushed_records: u64,
    restored_failed: u32,
    failed: Vec<u32>,
}

impl ExtractionRun {
    /// Starts a fresh run.
    pub fn new(job: &ExtractionJob, page_size: u32, start: DateTime<Utc>) -> Self {
        Self {
            extraction_id: job.extraction_id(),
            category: job.category.clone(),
            output_name: job.output_name.clone(),
            page_size,
            known_total_pages: None,
            stats: ExtractionStats::new(start),
            buffer: Vec::new(),
            last_page: 0,
            flushed_records: 0,
            restored_failed: 0,
            failed: Vec::new(),
        }
    }

    /// Continues an interrupted run from `checkpoint`.
    pub fn resume(
        job: &ExtractionJob,
        checkpoint: &Checkpoint,
        default_page_size: u32,
        start: DateTime<Utc>,
    ) -> Self {
        let page_size = checkpoint
            .get_u32(PAGE_SIZE_FIELD)
            .filter(|&size| size > 0)
            .unwrap_or(default_page_size);
        let restored_failed = checkpoint.get_u32(FAILED_PAGES_FIELD).unwrap_or(0);

        let mut run = Self::new(job, page_size, start);
        run.known_total_pages = checkpoint.get_u32(TOTAL_PAGES_FIELD);
        run.last_page = checkpoint.last_page;
        run.flushed_records = checkpoint.total_records;
        run.restored_failed = restored_failed;
        run.stats.total_records = checkpoint.total_records;
        run.stats.total_pages = checkpoint.last_page;
        run.stats.failed_pages = restored_failed;
        run.stats.used_fallback = true;
        run.stats.resumed_from_page = Some(checkpoint.last_page + 1);
        run
    }

    /// Next page to request.
    pub fn next_page(&self) -> u32 {
        self.last_page + 1
    }

    /// Highest page whose records have all reached the sink.
    pub fn committed_page(&self) -> u32 {
        match self.buffer.first() {
            Some((page, _)) => page.saturating_sub(1),
            None => self.last_page,
        }
    }

    /// Records flushed so far, restored ones included.
    pub fn flushed_records(&self) -> u64 {
        self.flushed_records
    }

    /// Records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the next flush appends to the destination.
    pub fn append_next(&self) -> bool {
        self.flushed_records > 0
    }

    /// Buffers the records of `page`.
    pub fn push_page(&mut self, page: u32, records: Vec<Record>) {
        self.last_page = self.last_page.max(page);
        if records.is_empty() {
            return;
        }
        self.stats.total_pages = self.stats.total_pages.max(page);
        self.stats.total_records += records.len() as u64;
        self.buffer.extend(records.into_iter().map(|record| (page, record)));
    }

    /// Counts `page` as failed.
    pub fn record_failure(&mut self, page: u32) {
        self.last_page = self.last_page.max(page);
        self.failed.push(page);
        self.stats.failed_pages += 1;
    }

    /// Removes and returns one full batch, if the buffer holds one.
    pub fn take_full_batch(&mut self, batch_size: usize) -> Option<Vec<Record>> {
        let batch_size = batch_size.max(1);
        if self.buffer.len() < batch_size {
            return None;
        }
        Some(self.buffer.drain(..batch_size).map(|(_, record)| record).collect())
    }

    /// Removes and returns whatever is buffered.
    pub fn take_remaining(&mut self) -> Option<Vec<Record>> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.drain(..).map(|(_, record)| record).collect())
    }

    /// Notes that `count` records reached the sink.
    pub fn mark_flushed(&mut self, count: usize) {
        self.flushed_records += count as u64;
    }

    /// Checkpoint contents describing committed progress.
    pub fn checkpoint_state(&self) -> CheckpointState {
        let committed = self.committed_page();
        let failed = self.restored_failed as usize
            + self.failed.iter().filter(|&&page| page <= committed).count();

        let mut state = CheckpointState::new();
        state.insert("last_page".to_string(), json!(committed));
        state.insert("total_records".to_string(), json!(self.flushed_records));
        state.insert(PAGE_SIZE_FIELD.to_string(), json!(self.page_size));
        state.insert(FAILED_PAGES_FIELD.to_string(), json!(failed));
        if let Some(total) = self.known_total_pages {
            state.insert(TOTAL_PAGES_FIELD.to_string(), json!(total));
        }
        state.insert("category".to_string(), json!(self.category));
        state.insert("output_name".to_string(), json!(self.output_name));
        state
    }
}
