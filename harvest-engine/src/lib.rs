// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Harvest Engine
//!
//! Resumable, rate-limited extraction of paginated data.
//!
//! The engine first asks the source for everything in one response. If
//! that fails it pages through the data, checkpointing as batches reach
//! the sink, and records every run in the metadata registry.
//!
//! ## Example
//!
//! ```ignore
//! use harvest_engine::{ExtractionEngine, ExtractionJob, ExtractionOutcome};
//!
//! let engine = ExtractionEngine::builder(source, sink, registry)
//!     .config(config)
//!     .build()?;
//!
//! match engine.run(&ExtractionJob::new("orders", "sales", "orders")).await? {
//!     ExtractionOutcome::Completed { stats, entry } => {
//!         println!("{} records, complete: {}", stats.total_records, entry.is_complete);
//!     }
//!     ExtractionOutcome::Skipped { .. } => println!("fresh, skipped"),
//! }
//! ```

pub mod cached;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod job;
pub mod run;
pub mod strategy;

pub use cached::CachedSource;
pub use engine::{ExtractionEngine, ExtractionEngineBuilder, EXTRACTED_AT_FIELD, SOURCE_FIELD};
pub use error::ExtractionError;
pub use hooks::{BatchHook, FnHook};
pub use job::{ExtractionJob, ExtractionOutcome, DEFAULT_VARIANT};
pub use run::ExtractionRun;
pub use strategy::{PageMode, StrategyKind};
