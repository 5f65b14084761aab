//! The extraction engine.
//!
//! One [`ExtractionEngine::run`] call walks through these steps:
//!
//! 1. Skip when the registry says the last extraction is complete and fresh,
//!    the latest run did not fail and no checkpoint is pending.
//! 2. Validate the source. Failures here abort before any request.
//! 3. Resume from a checkpoint if one exists, otherwise try the bulk
//!    strategy and fall back to pagination.
//! 4. Flush the final batch, record the run, clear the checkpoint.
//!
//! Page-level failures are counted and absorbed. Everything else is
//! recorded in the registry as an error run and returned.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use harvest_core::{Clock, PageResponse, Record, SystemClock};
use harvest_fetch::{FetchError, QueryParams, RateLimiter, RetryStrategy, Source, BULK_PAGE_SIZE};
use harvest_store::{CheckpointStore, HarvestConfig, MetadataRegistry, Sink};
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExtractionError;
use crate::hooks::{apply_all, BatchHook};
use crate::job::{ExtractionJob, ExtractionOutcome};
use crate::run::ExtractionRun;
use crate::strategy::{should_fallback, PageMode, StrategyKind};

/// Field holding the extraction timestamp on every record.
pub const EXTRACTED_AT_FIELD: &str = "_extracted_at";
/// Field holding the source identifier on every record.
pub const SOURCE_FIELD: &str = "_source";

// ============================================================================
// Extraction Engine
// ============================================================================

/// Pulls records from a [`Source`] into a [`Sink`].
pub struct ExtractionEngine {
    source: Arc<dyn Source>,
    sink: Arc<dyn Sink>,
    registry: Arc<MetadataRegistry>,
    checkpoints: CheckpointStore,
    limiter: Arc<RateLimiter>,
    retry: RetryStrategy,
    hooks: Vec<Arc<dyn BatchHook>>,
    clock: Arc<dyn Clock>,
    config: HarvestConfig,
}

impl ExtractionEngine {
    /// Starts building an engine.
    pub fn builder(
        source: Arc<dyn Source>,
        sink: Arc<dyn Sink>,
        registry: Arc<MetadataRegistry>,
    ) -> ExtractionEngineBuilder {
        ExtractionEngineBuilder::new(source, sink, registry)
    }

    /// Settings in effect.
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Checkpoint store used for resume.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Metadata registry runs are recorded in.
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Runs one extraction job.
    #[instrument(skip(self, job), fields(endpoint = %job.endpoint, extraction_id = %job.extraction_id()))]
    pub async fn run(&self, job: &ExtractionJob) -> Result<ExtractionOutcome, ExtractionError> {
        let extraction_id = job.extraction_id();
        if !job.force {
            if let Some(last_extraction) = self.skip_as_fresh(job, &extraction_id).await {
                info!(last_extraction = ?last_extraction, "Data is complete and fresh, skipping");
                return Ok(ExtractionOutcome::Skipped { last_extraction });
            }
        }

        if let Err(e) = self.source.validate().await {
            error!(source = self.source.id(), error = %e, "Source validation failed");
            return Err(ExtractionError::Config(format!(
                "source {} is not usable: {e}",
                self.source.id()
            )));
        }

        let checkpoint = self.checkpoints.load_checkpoint(&extraction_id).await?;
        let start = self.clock.now();
        let mut run = match &checkpoint {
            Some(checkpoint) => {
                info!(
                    last_page = checkpoint.last_page,
                    records = checkpoint.total_records,
                    "Resuming from checkpoint"
                );
                ExtractionRun::resume(job, checkpoint, self.config.page_size, start)
            }
            None => {
                info!(source = self.source.id(), "Starting extraction");
                ExtractionRun::new(job, self.config.page_size, start)
            }
        };

        let result = self.extract(job, &mut run, checkpoint.is_some()).await;
        let end = self.clock.now();

        match result {
            Ok(()) => {
                run.stats.finish(end);
                let entry = self
                    .registry
                    .update_extraction(&job.endpoint, &run.stats, &job.category, &job.output_name)
                    .await?;
                self.checkpoints.clear(&extraction_id).await?;
                info!(
                    records = run.stats.total_records,
                    pages = run.stats.total_pages,
                    failed_pages = run.stats.failed_pages,
                    used_fallback = run.stats.used_fallback,
                    complete = entry.is_complete,
                    duration_s = run.stats.duration_seconds(),
                    "Extraction finished"
                );
                Ok(ExtractionOutcome::Completed {
                    stats: run.stats,
                    entry,
                })
            }
            Err(e) => {
                error!(
                    error = %e,
                    records = run.stats.total_records,
                    pages = run.stats.total_pages,
                    "Extraction failed"
                );
                run.stats.fail(end, e.to_string());
                if let Err(record_err) = self
                    .registry
                    .update_extraction(&job.endpoint, &run.stats, &job.category, &job.output_name)
                    .await
                {
                    warn!(error = %record_err, "Could not record failed run");
                }
                Err(e)
            }
        }
    }

    /// Returns the last extraction time when the run can be skipped.
    ///
    /// A pending checkpoint or an incomplete latest run always forces a run,
    /// even when an older successful run is still fresh.
    async fn skip_as_fresh(
        &self,
        job: &ExtractionJob,
        extraction_id: &str,
    ) -> Option<Option<DateTime<Utc>>> {
        let (fresh, last_extraction) = self
            .registry
            .should_extract_incremental(&job.endpoint, self.config.max_age_hours)
            .await;
        if !fresh {
            return None;
        }

        let latest_complete = self
            .registry
            .get_endpoint(&job.endpoint)
            .await
            .is_some_and(|entry| entry.is_complete);
        if !latest_complete {
            debug!("Latest run is incomplete, not skipping");
            return None;
        }

        if self.checkpoints.exists(extraction_id).await {
            debug!("Checkpoint pending, resuming instead of skipping");
            return None;
        }

        Some(last_extraction)
    }

    async fn extract(
        &self,
        job: &ExtractionJob,
        run: &mut ExtractionRun,
        resuming: bool,
    ) -> Result<(), ExtractionError> {
        let try_bulk = !resuming && job.bulk && self.config.bulk_enabled;
        if !(try_bulk && self.bulk(job, run).await?) {
            run.stats.used_fallback = true;
            self.paginate(job, run).await?;
        }

        if let Some(batch) = run.take_remaining() {
            self.flush(run, batch).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Bulk Strategy
    // ========================================================================

    /// Returns `Ok(true)` when the bulk response was taken.
    async fn bulk(&self, job: &ExtractionJob, run: &mut ExtractionRun) -> Result<bool, ExtractionError> {
        let strategy = StrategyKind::Bulk;
        match self.fetch_page(1, BULK_PAGE_SIZE, &job.params).await {
            Ok(response) => {
                if let Some(metadata) = &response.metadata {
                    run.stats.record_attempt(strategy.label(), metadata);
                }
                if response.has_more_pages() && !response.is_empty() {
                    error!(
                        records = response.len(),
                        "Bulk response reports more pages, refusing partial data"
                    );
                    return Err(ExtractionError::IncompleteBulkFetch {
                        records: response.len(),
                        metadata: response.metadata.unwrap_or_default(),
                    });
                }
                if response.is_empty() {
                    info!("Bulk response was empty, falling back to pagination");
                    return Ok(false);
                }
                info!(records = response.len(), "Bulk fetch succeeded");
                self.accept_page(run, 1, response.records).await?;
                Ok(true)
            }
            Err(e) if should_fallback(&e) => {
                warn!(error = %e, "Bulk fetch failed, falling back to pagination");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Paginated Strategy
    // ========================================================================

    async fn paginate(&self, job: &ExtractionJob, run: &mut ExtractionRun) -> Result<(), ExtractionError> {
        let page_size = run.page_size;
        let mut next = run.next_page();
        let mut leading_failures = 0;

        if next == 1 {
            match self.fetch_page(1, page_size, &job.params).await {
                Ok(response) => {
                    if let Some(metadata) = &response.metadata {
                        run.stats.record_attempt("page_1", metadata);
                        run.known_total_pages = metadata.total_pages(page_size);
                    }
                    let last = is_last_page(&response, page_size);
                    self.accept_page(run, 1, response.records).await?;
                    if run.known_total_pages.is_none() && last {
                        debug!("First page is the last page");
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.page_failed(run, 1, e).await?;
                    leading_failures = 1;
                }
            }
            next = 2;
        }

        match PageMode::from_total(run.known_total_pages) {
            PageMode::KnownTotal(total) => {
                info!(total_pages = total, page_size, from = next, "Fetching known page range");
                self.fetch_range(job, run, next, total).await?;
                run.stats.total_pages = run.stats.total_pages.max(total);
                Ok(())
            }
            PageMode::UnknownTotal => {
                info!(page_size, from = next, "Total unknown, paging until a short page");
                self.fetch_until_short(job, run, next, leading_failures).await
            }
        }
    }

    async fn fetch_range(
        &self,
        job: &ExtractionJob,
        run: &mut ExtractionRun,
        first: u32,
        last: u32,
    ) -> Result<(), ExtractionError> {
        if first > last {
            return Ok(());
        }
        let page_size = run.page_size;

        for chunk in page_chunks(first, last, self.config.page_concurrency) {
            let responses = join_all(
                chunk
                    .clone()
                    .map(|page| self.fetch_page(page, page_size, &job.params)),
            )
            .await;

            for (page, response) in chunk.zip(responses) {
                match response {
                    Ok(response) => self.accept_page(run, page, response.records).await?,
                    Err(e) => self.page_failed(run, page, e).await?,
                }
            }
        }
        Ok(())
    }

    async fn fetch_until_short(
        &self,
        job: &ExtractionJob,
        run: &mut ExtractionRun,
        first: u32,
        prior_failures: u32,
    ) -> Result<(), ExtractionError> {
        let page_size = run.page_size;
        let max_failures = self.config.max_consecutive_failures.max(1);
        let mut consecutive_failures = prior_failures;
        let mut page = first;

        loop {
            match self.fetch_page(page, page_size, &job.params).await {
                Ok(response) => {
                    consecutive_failures = 0;
                    let last = is_last_page(&response, page_size);
                    self.accept_page(run, page, response.records).await?;
                    if last {
                        debug!(page, "Reached last page");
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.page_failed(run, page, e).await?;
                    consecutive_failures += 1;
                    if consecutive_failures >= max_failures {
                        warn!(
                            page,
                            consecutive_failures, "Too many consecutive page failures, stopping"
                        );
                        return Ok(());
                    }
                }
            }
            page += 1;
        }
    }

    // ========================================================================
    // Page Handling
    // ========================================================================

    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> Result<PageResponse, FetchError> {
        let label = if page_size == BULK_PAGE_SIZE {
            StrategyKind::Bulk.label().to_string()
        } else {
            format!("page {page}")
        };
        let timeout = self.config.request_timeout();

        self.retry
            .execute(&label, || async move {
                let _permit = self.limiter.acquire().await;
                tokio::time::timeout(timeout, self.source.fetch(page, page_size, params))
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Timeout(timeout.as_secs())))
            })
            .await
    }

    async fn accept_page(
        &self,
        run: &mut ExtractionRun,
        page: u32,
        records: Vec<Record>,
    ) -> Result<(), ExtractionError> {
        let records = self.enrich(apply_all(&self.hooks, records));
        debug!(page, records = records.len(), "Page fetched");
        run.push_page(page, records);

        while let Some(batch) = run.take_full_batch(self.config.batch_size) {
            self.flush(run, batch).await?;
        }
        self.save_checkpoint(run).await
    }

    async fn page_failed(
        &self,
        run: &mut ExtractionRun,
        page: u32,
        error: FetchError,
    ) -> Result<(), ExtractionError> {
        if !should_fallback(&error) {
            return Err(error.into());
        }
        warn!(page, error = %error, "Page failed, continuing");
        run.record_failure(page);
        self.save_checkpoint(run).await
    }

    fn enrich(&self, mut records: Vec<Record>) -> Vec<Record> {
        let extracted_at = Value::String(self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let source = Value::String(self.source.id().to_string());
        for record in &mut records {
            record.insert(EXTRACTED_AT_FIELD.to_string(), extracted_at.clone());
            record.insert(SOURCE_FIELD.to_string(), source.clone());
        }
        records
    }

    async fn flush(&self, run: &mut ExtractionRun, batch: Vec<Record>) -> Result<(), ExtractionError> {
        let append = run.append_next();
        self.sink.write_batch(&batch, &run.output_name, append).await?;
        run.mark_flushed(batch.len());
        debug!(
            destination = %run.output_name,
            records = batch.len(),
            append,
            flushed = run.flushed_records(),
            "Batch flushed"
        );
        Ok(())
    }

    async fn save_checkpoint(&self, run: &ExtractionRun) -> Result<(), ExtractionError> {
        if !run.stats.used_fallback || run.committed_page() == 0 {
            return Ok(());
        }
        self.checkpoints
            .save(&run.extraction_id, run.checkpoint_state())
            .await?;
        debug!(last_page = run.committed_page(), "Checkpoint saved");
        Ok(())
    }
}

/// A short or empty page ends a run whose total is unknown.
fn is_last_page(response: &PageResponse, page_size: u32) -> bool {
    response.is_empty() || response.len() < page_size as usize
}

/// Splits `first..=last` into consecutive ranges of at most `concurrency`
/// pages, produced lazily.
fn page_chunks(first: u32, last: u32, concurrency: usize) -> impl Iterator<Item = RangeInclusive<u32>> {
    let size = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
    (first..=last)
        .step_by(size as usize)
        .map(move |start| start..=start.saturating_add(size - 1).min(last))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ExtractionEngine`].
pub struct ExtractionEngineBuilder {
    source: Arc<dyn Source>,
    sink: Arc<dyn Sink>,
    registry: Arc<MetadataRegistry>,
    config: HarvestConfig,
    checkpoints: Option<CheckpointStore>,
    limiter: Option<Arc<RateLimiter>>,
    retry: Option<RetryStrategy>,
    hooks: Vec<Arc<dyn BatchHook>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ExtractionEngineBuilder {
    /// Creates a builder with default settings.
    pub fn new(source: Arc<dyn Source>, sink: Arc<dyn Sink>, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            source,
            sink,
            registry,
            config: HarvestConfig::default(),
            checkpoints: None,
            limiter: None,
            retry: None,
            hooks: Vec::new(),
            clock: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: HarvestConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `store` instead of one rooted at `config.checkpoint_dir`.
    #[must_use]
    pub fn checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Shares a rate limiter across engines.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Overrides the retry strategy derived from the config.
    #[must_use]
    pub fn retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Appends a batch hook.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn BatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Sets the clock for timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the config and builds the engine.
    pub fn build(self) -> Result<ExtractionEngine, ExtractionError> {
        self.config
            .validate()
            .map_err(|e| ExtractionError::Config(e.to_string()))?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        if self.registry.page_size_limit() != config.page_size {
            warn!(
                registry = self.registry.page_size_limit(),
                config = config.page_size,
                "Registry page size limit differs from configured page size"
            );
        }

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(RateLimiter::new(
                config.calls_per_period,
                config.period(),
                config.safety_buffer,
            ))
        });
        let retry = self.retry.unwrap_or_else(|| {
            RetryStrategy::new(config.max_attempts()).with_base_delay(config.retry_base_delay())
        });
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| CheckpointStore::new(&config.checkpoint_dir).with_clock(clock.clone()));

        Ok(ExtractionEngine {
            source: self.source,
            sink: self.sink,
            registry: self.registry,
            checkpoints,
            limiter,
            retry,
            hooks: self.hooks,
            clock,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_core::PageMetadata;
    use harvest_store::MemorySink;
    use tempfile::TempDir;

    struct FixedSource {
        pages: Vec<usize>,
    }

    #[async_trait]
    impl Source for FixedSource {
        fn id(&self) -> &str {
            "fixed"
        }

        async fn fetch(
            &self,
            page: u32,
            _page_size: u32,
            _params: &QueryParams,
        ) -> Result<PageResponse, FetchError> {
            let count = self.pages.get(page as usize - 1).copied().unwrap_or(0);
            let records = (0..count)
                .map(|i| {
                    let mut record = Record::new();
                    record.insert("id".to_string(), i.into());
                    record
                })
                .collect();
            Ok(PageResponse::new(records).with_metadata(PageMetadata {
                page: Some(page),
                ..Default::default()
            }))
        }
    }

    async fn engine(dir: &TempDir, source: FixedSource, config: HarvestConfig) -> (ExtractionEngine, Arc<MemorySink>) {
        let registry = Arc::new(
            MetadataRegistry::open(dir.path().join("meta.json"), config.page_size)
                .await
                .unwrap(),
        );
        let sink = Arc::new(MemorySink::new());
        let engine = ExtractionEngine::builder(Arc::new(source), sink.clone(), registry)
            .config(HarvestConfig {
                checkpoint_dir: dir.path().join("checkpoints"),
                ..config
            })
            .rate_limiter(Arc::new(RateLimiter::unlimited()))
            .retry(RetryStrategy::no_retry())
            .build()
            .unwrap();
        (engine, sink)
    }

    #[test]
    fn test_is_last_page() {
        assert!(is_last_page(&PageResponse::default(), 10));
        assert!(!is_last_page(&PageResponse::new(vec![Record::new(); 10]), 10));
        assert!(is_last_page(&PageResponse::new(vec![Record::new(); 9]), 10));
    }

    #[test]
    fn test_page_chunks() {
        let chunks: Vec<_> = page_chunks(2, 8, 3).collect();
        assert_eq!(chunks, vec![2..=4, 5..=7, 8..=8]);

        assert_eq!(page_chunks(2, 5, 0).count(), 4);
        assert_eq!(page_chunks(3, 2, 4).count(), 0);
    }

    #[test]
    fn test_page_chunks_are_lazy_for_huge_totals() {
        let mut chunks = page_chunks(2, u32::MAX, 4);
        assert_eq!(chunks.next(), Some(2..=5));
        assert_eq!(chunks.next(), Some(6..=9));

        let tail = page_chunks(u32::MAX - 1, u32::MAX, 4).collect::<Vec<_>>();
        assert_eq!(tail, vec![u32::MAX - 1..=u32::MAX]);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(MetadataRegistry::open(dir.path().join("m.json"), 10).await.unwrap());
        let result = ExtractionEngine::builder(
            Arc::new(FixedSource { pages: vec![] }),
            Arc::new(MemorySink::new()),
            registry,
        )
        .config(HarvestConfig {
            batch_size: 0,
            ..Default::default()
        })
        .build();

        assert!(matches!(result, Err(ExtractionError::Config(_))));
    }

    #[tokio::test]
    async fn test_batches_are_bounded_by_batch_size() {
        let dir = TempDir::new().unwrap();
        let config = HarvestConfig {
            page_size: 4,
            batch_size: 3,
            bulk_enabled: false,
            ..Default::default()
        };
        let (engine, sink) = engine(&dir, FixedSource { pages: vec![4, 4, 2] }, config).await;

        let outcome = engine.run(&ExtractionJob::new("items", "test", "items")).await.unwrap();

        let sizes: Vec<usize> = sink.batches().iter().map(|b| b.records.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert!(!sink.batches()[0].append);
        assert!(sink.batches()[1..].iter().all(|b| b.append));
        assert_eq!(outcome.stats().unwrap().total_records, 10);
    }

    #[tokio::test]
    async fn test_unknown_total_stops_on_empty_page() {
        let dir = TempDir::new().unwrap();
        let config = HarvestConfig {
            page_size: 2,
            bulk_enabled: false,
            ..Default::default()
        };
        let (engine, sink) = engine(&dir, FixedSource { pages: vec![2, 2] }, config).await;

        let outcome = engine.run(&ExtractionJob::new("items", "test", "items")).await.unwrap();
        let stats = outcome.stats().unwrap();

        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.total_pages, 2);
        assert_eq!(sink.records("items").len(), 4);
    }
}
