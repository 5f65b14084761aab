// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Harvest Store
//!
//! Durable state for extractions.
//!
//! This crate provides:
//!
//! - **CheckpointStore**: Per-extraction resume state, one JSON file each
//! - **MetadataRegistry**: Per-endpoint history and completeness
//! - **Sink**: Where flushed batches go (`JsonLinesSink`, `MemorySink`)
//! - **TtlCache**: Small expiring cache used by the cached source
//! - **HarvestConfig**: Settings from file and `HARVEST_*` variables
//! - **Persistence**: File I/O helpers for JSON data
//!
//! ## Usage
//!
//! ```ignore
//! use harvest_store::{CheckpointStore, MetadataRegistry};
//!
//! let checkpoints = CheckpointStore::new("/var/lib/harvest/checkpoints");
//! let registry = MetadataRegistry::open("/var/lib/harvest/extraction_metadata.json", 2000).await?;
//!
//! if let Some(state) = checkpoints.load("orders_all").await? {
//!     println!("resuming after {:?}", state.get("last_page"));
//! }
//! for name in registry.get_incomplete_endpoints().await {
//!     println!("incomplete: {name}");
//! }
//! ```

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metadata;
pub mod persistence;
pub mod sink;

pub use cache::TtlCache;
pub use checkpoint::{Checkpoint, CheckpointState, CheckpointStore, CheckpointSummary};
pub use config::HarvestConfig;
pub use error::StoreError;
pub use metadata::{
    assess_completeness, Completeness, ExtractionRecord, MetadataEntry, MetadataRegistry,
    RegistryDocument, RegistrySummary, MAX_HISTORY_ENTRIES,
};
pub use persistence::{
    default_checkpoint_dir, default_data_dir, default_metadata_path, load_json, save_json,
};
pub use sink::{JsonLinesSink, MemorySink, Sink, WrittenBatch};
