//! End-to-end extraction scenarios against a scripted source.

use async_trait::async_trait;
use harvest_core::{PageMetadata, PageResponse, Record, RunStatus};
use harvest_engine::{
    ExtractionEngine, ExtractionError, ExtractionJob, ExtractionOutcome, FnHook, EXTRACTED_AT_FIELD,
    SOURCE_FIELD,
};
use harvest_fetch::{FetchError, QueryParams, RateLimiter, RetryStrategy, Source, BULK_PAGE_SIZE};
use harvest_store::{
    CheckpointState, HarvestConfig, JsonLinesSink, MemorySink, MetadataRegistry, Sink, StoreError,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Stub Source
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
enum Bulk {
    /// Bulk requests fail with a non-fatal status.
    #[default]
    Unsupported,
    /// Bulk requests return everything.
    Full,
    /// Bulk requests return this many records and claim more pages.
    Truncated(usize),
    /// Bulk requests return nothing but claim more pages.
    EmptyWithMore,
}

#[derive(Default)]
struct StubSource {
    dataset: usize,
    report_total: bool,
    bulk: Bulk,
    failing_pages: HashSet<u32>,
    credentials_missing: bool,
    requests: Mutex<Vec<(u32, u32)>>,
}

impl StubSource {
    fn new(dataset: usize) -> Self {
        Self {
            dataset,
            report_total: true,
            ..Default::default()
        }
    }

    fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    fn with_bulk(mut self, bulk: Bulk) -> Self {
        self.bulk = bulk;
        self
    }

    fn failing(mut self, pages: &[u32]) -> Self {
        self.failing_pages = pages.iter().copied().collect();
        self
    }

    fn requests(&self) -> Vec<(u32, u32)> {
        self.requests.lock().unwrap().clone()
    }

    fn requested_pages(&self) -> Vec<u32> {
        self.requests()
            .into_iter()
            .filter(|&(_, size)| size != BULK_PAGE_SIZE)
            .map(|(page, _)| page)
            .collect()
    }

    fn records(&self, range: std::ops::Range<usize>) -> Vec<Record> {
        range
            .map(|id| {
                let mut record = Record::new();
                record.insert("id".to_string(), json!(id));
                record
            })
            .collect()
    }

    fn total(&self) -> Option<u64> {
        self.report_total.then_some(self.dataset as u64)
    }
}

#[async_trait]
impl Source for StubSource {
    fn id(&self) -> &str {
        "stub-api"
    }

    async fn validate(&self) -> Result<(), FetchError> {
        if self.credentials_missing {
            return Err(FetchError::MissingCredentials("STUB_API_KEY".to_string()));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        page: u32,
        page_size: u32,
        _params: &QueryParams,
    ) -> Result<PageResponse, FetchError> {
        self.requests.lock().unwrap().push((page, page_size));

        if page_size == BULK_PAGE_SIZE {
            return match self.bulk {
                Bulk::Unsupported => Err(FetchError::Status {
                    status: 400,
                    body: "page_size must be positive".to_string(),
                }),
                Bulk::Full => Ok(PageResponse::new(self.records(0..self.dataset)).with_metadata(
                    PageMetadata {
                        total_count: self.total(),
                        ..Default::default()
                    },
                )),
                Bulk::Truncated(n) => Ok(PageResponse::new(self.records(0..n)).with_metadata(
                    PageMetadata {
                        page: Some(1),
                        page_size: Some(n as u32),
                        total_count: self.total(),
                        has_more_pages: true,
                    },
                )),
                Bulk::EmptyWithMore => Ok(PageResponse::new(Vec::new()).with_metadata(PageMetadata {
                    total_count: self.total(),
                    has_more_pages: true,
                    ..Default::default()
                })),
            };
        }

        if self.failing_pages.contains(&page) {
            return Err(FetchError::Timeout(1));
        }

        let size = page_size as usize;
        let start = ((page as usize - 1) * size).min(self.dataset);
        let end = (start + size).min(self.dataset);
        Ok(PageResponse::new(self.records(start..end)).with_metadata(PageMetadata {
            page: Some(page),
            page_size: Some(page_size),
            total_count: self.total(),
            has_more_pages: end < self.dataset,
        }))
    }
}

/// Fails the n-th write, passes everything else to a memory sink.
struct FlakySink {
    inner: MemorySink,
    fail_on: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl Sink for FlakySink {
    async fn write_batch(
        &self,
        records: &[Record],
        destination: &str,
        append: bool,
    ) -> Result<(), StoreError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Sink("disk full".to_string()));
        }
        self.inner.write_batch(records, destination, append).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn config(dir: &Path, page_size: u32) -> HarvestConfig {
    HarvestConfig {
        page_size,
        batch_size: 1000,
        bulk_enabled: false,
        checkpoint_dir: dir.join("checkpoints"),
        metadata_path: dir.join("extraction_metadata.json"),
        ..Default::default()
    }
}

async fn build(
    config: HarvestConfig,
    source: Arc<StubSource>,
    sink: Arc<dyn Sink>,
) -> (ExtractionEngine, Arc<MetadataRegistry>) {
    let registry = Arc::new(
        MetadataRegistry::open(&config.metadata_path, config.page_size)
            .await
            .unwrap(),
    );
    let engine = ExtractionEngine::builder(source, sink, registry.clone())
        .config(config)
        .rate_limiter(Arc::new(RateLimiter::unlimited()))
        .retry(RetryStrategy::no_retry())
        .build()
        .unwrap();
    (engine, registry)
}

fn job() -> ExtractionJob {
    ExtractionJob::new("orders", "sales", "orders")
}

fn completed(outcome: ExtractionOutcome) -> (harvest_core::ExtractionStats, harvest_store::MetadataEntry) {
    match outcome {
        ExtractionOutcome::Completed { stats, entry } => (stats, entry),
        ExtractionOutcome::Skipped { .. } => panic!("run was skipped"),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_known_total_fetches_exact_page_count() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4500));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 2000), source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requests(), vec![(1, 2000), (2, 2000), (3, 2000)]);
    assert_eq!(stats.total_pages, 3);
    assert_eq!(stats.total_records, 4500);
    assert_eq!(stats.failed_pages, 0);
    assert!(stats.used_fallback);
    assert!(entry.is_complete);
    assert_eq!(sink.records("orders").len(), 4500);
}

#[tokio::test]
async fn test_concurrent_pages_yield_same_dataset() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4500));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        page_concurrency: 3,
        ..config(dir.path(), 1000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    let mut pages = source.requested_pages();
    pages.sort_unstable();
    assert_eq!(pages, vec![1, 2, 3, 4, 5]);
    assert_eq!(stats.total_pages, 5);
    assert_eq!(stats.total_records, 4500);
    assert!(entry.is_complete);

    let ids: HashSet<u64> = sink
        .records("orders")
        .iter()
        .filter_map(|r| r["id"].as_u64())
        .collect();
    assert_eq!(ids.len(), 4500);
}

#[tokio::test]
async fn test_bulk_success_uses_single_request() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(300).with_bulk(Bulk::Full));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        bulk_enabled: true,
        ..config(dir.path(), 2000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requests(), vec![(1, BULK_PAGE_SIZE)]);
    assert!(!stats.used_fallback);
    assert_eq!(stats.total_records, 300);
    assert!(stats.attempts.contains_key("bulk"));
    assert!(entry.is_complete);
    assert_eq!(sink.records("orders").len(), 300);
}

#[tokio::test]
async fn test_bulk_failure_falls_back_to_pages() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(2500).with_bulk(Bulk::Unsupported));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        bulk_enabled: true,
        ..config(dir.path(), 2000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, _) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requests(), vec![(1, BULK_PAGE_SIZE), (1, 2000), (2, 2000)]);
    assert!(stats.used_fallback);
    assert_eq!(stats.total_records, 2500);
}

#[tokio::test]
async fn test_bulk_contract_violation_is_fatal() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(5000).with_bulk(Bulk::Truncated(2000)));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        bulk_enabled: true,
        ..config(dir.path(), 2000)
    };
    let (engine, registry) = build(config, source.clone(), sink.clone()).await;

    let err = engine.run(&job()).await.unwrap_err();

    assert!(matches!(err, ExtractionError::IncompleteBulkFetch { records: 2000, .. }));
    assert_eq!(source.requests(), vec![(1, BULK_PAGE_SIZE)]);
    assert!(sink.batches().is_empty());
    assert!(!engine.checkpoints().exists("orders_all").await);

    let entry = registry.get_endpoint("orders").await.unwrap();
    let last = entry.extraction_history.back().unwrap();
    assert_eq!(last.status, RunStatus::Error);
    assert!(!entry.is_complete);
    assert!(entry.last_successful_extraction.is_none());
}

#[tokio::test]
async fn test_empty_bulk_response_falls_back_even_with_more_pages() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(2500).with_bulk(Bulk::EmptyWithMore));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        bulk_enabled: true,
        ..config(dir.path(), 2000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requests(), vec![(1, BULK_PAGE_SIZE), (1, 2000), (2, 2000)]);
    assert!(stats.used_fallback);
    assert_eq!(stats.total_records, 2500);
    assert!(entry.is_complete);
}

#[tokio::test]
async fn test_resume_requests_next_page_only() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4500).with_bulk(Bulk::Full));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        bulk_enabled: true,
        ..config(dir.path(), 2000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let mut state = CheckpointState::new();
    state.insert("last_page".to_string(), json!(2));
    state.insert("total_records".to_string(), json!(4000));
    state.insert("page_size".to_string(), json!(2000));
    state.insert("total_pages".to_string(), json!(3));
    engine.checkpoints().save("orders_all", state).await.unwrap();

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requests(), vec![(3, 2000)]);
    assert_eq!(stats.resumed_from_page, Some(3));
    assert_eq!(stats.total_records, 4500);
    assert_eq!(stats.total_pages, 3);
    assert!(entry.is_complete);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].append);
    assert!(!engine.checkpoints().exists("orders_all").await);
}

#[tokio::test]
async fn test_resume_without_total_continues_paging() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(2500).without_total());
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 1000), source.clone(), sink.clone()).await;

    let mut state = CheckpointState::new();
    state.insert("last_page".to_string(), json!(1));
    state.insert("total_records".to_string(), json!(1000));
    engine.checkpoints().save("orders_all", state).await.unwrap();

    let (stats, _) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![2, 3]);
    assert_eq!(stats.total_records, 2500);
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_sink_left_off() {
    let dir = TempDir::new().unwrap();
    let config = HarvestConfig {
        batch_size: 10,
        ..config(dir.path(), 10)
    };

    let source = Arc::new(StubSource::new(30));
    let flaky = Arc::new(FlakySink {
        inner: MemorySink::new(),
        fail_on: 2,
        writes: AtomicUsize::new(0),
    });
    let (engine, registry) = build(config.clone(), source.clone(), flaky.clone()).await;

    let err = engine.run(&job()).await.unwrap_err();
    assert!(matches!(err, ExtractionError::Store(StoreError::Sink(_))));
    assert_eq!(flaky.inner.records("orders").len(), 10);

    let checkpoint = engine.checkpoints().load_checkpoint("orders_all").await.unwrap().unwrap();
    assert_eq!(checkpoint.last_page, 1);
    assert_eq!(checkpoint.total_records, 10);
    let entry = registry.get_endpoint("orders").await.unwrap();
    assert_eq!(entry.extraction_history.back().unwrap().status, RunStatus::Error);
    drop(engine);
    drop(registry);

    let source = Arc::new(StubSource::new(30));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![2, 3]);
    assert_eq!(stats.total_records, 30);
    assert!(entry.is_complete);
    assert!(sink.batches().iter().all(|b| b.append));
    assert!(!engine.checkpoints().exists("orders_all").await);
}

#[tokio::test]
async fn test_failed_pages_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4500).failing(&[2]));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 2000), source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![1, 2, 3]);
    assert_eq!(stats.failed_pages, 1);
    assert_eq!(stats.total_records, 2500);
    assert_eq!(stats.status, RunStatus::Success);
    assert!(!entry.is_complete);
    assert!(entry
        .completeness_notes
        .iter()
        .any(|n| n.starts_with("1 page(s) failed")));
    assert!(!engine.checkpoints().exists("orders_all").await);
}

#[tokio::test]
async fn test_unknown_total_stops_at_short_page() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4500).without_total());
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 2000), source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![1, 2, 3]);
    assert_eq!(stats.total_records, 4500);
    assert!(entry.is_complete);
}

#[tokio::test]
async fn test_unknown_total_exact_multiple_costs_one_empty_page() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(4000).without_total());
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 2000), source.clone(), sink.clone()).await;

    let (stats, _) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![1, 2, 3]);
    assert_eq!(stats.total_records, 4000);
    assert_eq!(stats.total_pages, 2);
}

#[tokio::test]
async fn test_unknown_total_gives_up_after_consecutive_failures() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(10_000).without_total().failing(&[2, 3, 4, 5]));
    let sink = Arc::new(MemorySink::new());
    let config = HarvestConfig {
        max_consecutive_failures: 3,
        ..config(dir.path(), 1000)
    };
    let (engine, _) = build(config, source.clone(), sink.clone()).await;

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(source.requested_pages(), vec![1, 2, 3, 4]);
    assert_eq!(stats.failed_pages, 3);
    assert!(!entry.is_complete);
}

#[tokio::test]
async fn test_fresh_complete_data_is_skipped() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(100));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 50), source.clone(), sink.clone()).await;

    completed(engine.run(&job()).await.unwrap());
    let requests_after_first = source.requests().len();

    let outcome = engine.run(&job()).await.unwrap();
    assert!(matches!(
        outcome,
        ExtractionOutcome::Skipped {
            last_extraction: Some(_)
        }
    ));
    assert_eq!(source.requests().len(), requests_after_first);

    let forced = engine.run(&job().force(true)).await.unwrap();
    assert!(!forced.is_skipped());
    assert!(source.requests().len() > requests_after_first);
}

#[tokio::test]
async fn test_failed_forced_run_is_resumed_not_skipped() {
    let dir = TempDir::new().unwrap();
    let config = HarvestConfig {
        batch_size: 10,
        ..config(dir.path(), 10)
    };
    let source = Arc::new(StubSource::new(30));
    // Writes 1-3 belong to the first run, the forced rerun fails on its second write.
    let sink = Arc::new(FlakySink {
        inner: MemorySink::new(),
        fail_on: 5,
        writes: AtomicUsize::new(0),
    });
    let (engine, registry) = build(config, source.clone(), sink.clone()).await;

    completed(engine.run(&job()).await.unwrap());
    assert_eq!(sink.inner.records("orders").len(), 30);

    let err = engine.run(&job().force(true)).await.unwrap_err();
    assert!(matches!(err, ExtractionError::Store(StoreError::Sink(_))));
    assert_eq!(sink.inner.records("orders").len(), 10);
    assert!(engine.checkpoints().exists("orders_all").await);

    let (stats, entry) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(stats.resumed_from_page, Some(2));
    assert_eq!(stats.total_records, 30);
    assert!(entry.is_complete);
    assert_eq!(sink.inner.records("orders").len(), 30);
    assert!(!engine.checkpoints().exists("orders_all").await);
    assert_eq!(
        registry.get_endpoint("orders").await.unwrap().extraction_history.len(),
        3
    );

    assert!(engine.run(&job()).await.unwrap().is_skipped());
}

#[tokio::test]
async fn test_pending_checkpoint_is_resumed_even_when_fresh() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(100));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 50), source.clone(), sink.clone()).await;

    completed(engine.run(&job()).await.unwrap());

    let mut state = CheckpointState::new();
    state.insert("last_page".to_string(), json!(1));
    state.insert("total_records".to_string(), json!(50));
    state.insert("total_pages".to_string(), json!(2));
    engine.checkpoints().save("orders_all", state).await.unwrap();

    let (stats, _) = completed(engine.run(&job()).await.unwrap());

    assert_eq!(stats.resumed_from_page, Some(2));
    assert_eq!(stats.total_records, 100);
    assert!(!engine.checkpoints().exists("orders_all").await);
}

#[tokio::test]
async fn test_incomplete_data_is_not_skipped() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(100).failing(&[2]));
    let sink = Arc::new(MemorySink::new());
    let (engine, _) = build(config(dir.path(), 50), source.clone(), sink.clone()).await;

    completed(engine.run(&job()).await.unwrap());
    let second = engine.run(&job()).await.unwrap();

    assert!(!second.is_skipped());
}

#[tokio::test]
async fn test_missing_credentials_abort_before_requests() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource {
        credentials_missing: true,
        ..StubSource::new(100)
    });
    let sink = Arc::new(MemorySink::new());
    let (engine, registry) = build(config(dir.path(), 50), source.clone(), sink.clone()).await;

    let err = engine.run(&job()).await.unwrap_err();

    assert!(err.is_config());
    assert!(err.to_string().contains("STUB_API_KEY"));
    assert!(source.requests().is_empty());
    assert!(sink.batches().is_empty());
    assert!(registry.get_endpoint("orders").await.is_none());
    assert!(!engine.checkpoints().exists("orders_all").await);
}

#[tokio::test]
async fn test_hooks_run_before_enrichment() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(10));
    let sink = Arc::new(MemorySink::new());
    let config = config(dir.path(), 100);
    let registry = Arc::new(MetadataRegistry::open(&config.metadata_path, 100).await.unwrap());
    let engine = ExtractionEngine::builder(source, sink.clone(), registry)
        .config(config)
        .rate_limiter(Arc::new(RateLimiter::unlimited()))
        .retry(RetryStrategy::no_retry())
        .hook(Arc::new(FnHook::new("even-only", |batch: Vec<Record>| {
            batch
                .into_iter()
                .filter(|r| r["id"].as_u64().is_some_and(|id| id % 2 == 0))
                .collect()
        })))
        .hook(Arc::new(FnHook::new("no-source-yet", |batch: Vec<Record>| {
            assert!(batch.iter().all(|r| !r.contains_key(SOURCE_FIELD)));
            batch
        })))
        .build()
        .unwrap();

    let (stats, _) = completed(engine.run(&job()).await.unwrap());

    let records = sink.records("orders");
    assert_eq!(records.len(), 5);
    assert_eq!(stats.total_records, 5);
    for record in &records {
        assert_eq!(record[SOURCE_FIELD], json!("stub-api"));
        let stamp = record[EXTRACTED_AT_FIELD].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}

#[tokio::test]
async fn test_json_lines_output_on_disk() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StubSource::new(25));
    let sink = Arc::new(JsonLinesSink::new(dir.path().join("out")));
    let config = HarvestConfig {
        batch_size: 7,
        ..config(dir.path(), 10)
    };
    let (engine, _) = build(config, source, sink.clone()).await;

    completed(engine.run(&job()).await.unwrap());

    let content = tokio::fs::read_to_string(sink.path_for("orders")).await.unwrap();
    assert_eq!(content.lines().count(), 25);

    // A forced rerun replaces the file instead of appending to it.
    completed(engine.run(&job().force(true)).await.unwrap());
    let content = tokio::fs::read_to_string(sink.path_for("orders")).await.unwrap();
    assert_eq!(content.lines().count(), 25);
}
