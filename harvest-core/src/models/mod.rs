//! Domain models for harvest.

mod page;
mod stats;

#[cfg(test)]
mod serde_tests;

pub use page::{PageMetadata, PageResponse, Record};
pub use stats::{AttemptSnapshot, ExtractionStats, RunStatus};
