// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Harvest Core
//!
//! Core types and models shared by every `harvest` crate.
//!
//! This crate provides the foundational abstractions for the extraction
//! engine, the checkpoint store and the metadata registry:
//!
//! - Page and record models returned by a paginated source
//! - Run statistics folded into the metadata registry
//! - A clock abstraction so time-dependent logic can be tested
//! - Error types
//!
//! ## Key Types
//!
//! ### Page Types
//! - [`Record`] - A single schemaless record
//! - [`PageResponse`] - Records plus an optional metadata block
//! - [`PageMetadata`] - Paging information reported by a source
//!
//! ### Run Types
//! - [`ExtractionStats`] - Counters and timings of one extraction run
//! - [`AttemptSnapshot`] - Paging metadata observed by one attempt
//! - [`RunStatus`] - Outcome of a run
//!
//! ### Time
//! - [`Clock`] - Source of "now"
//! - [`SystemClock`] / [`ManualClock`] - Wall clock and test clock

pub mod clock;
pub mod error;
pub mod models;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use models::{
    // Page types
    PageMetadata,
    PageResponse,
    Record,
    // Run types
    AttemptSnapshot,
    ExtractionStats,
    RunStatus,
};
