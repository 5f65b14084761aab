// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Harvest Fetch
//!
//! The source side of an extraction: everything between the engine and
//! the remote API.
//!
//! - [`source::Source`] - Trait for paginated sources
//! - [`http::HttpSource`] - JSON-over-HTTP source built on reqwest
//! - [`rate_limiter::RateLimiter`] - Concurrency cap plus pacing floor
//! - [`retry::RetryStrategy`] - Exponential backoff for transient errors
//!
//! ## Example
//!
//! ```ignore
//! use harvest_fetch::{HttpSource, RateLimiter, Source};
//!
//! let source = HttpSource::builder("https://api.example.com/v1/items")
//!     .api_key_env("EXAMPLE_API_KEY")
//!     .build()?;
//! source.validate().await?;
//!
//! let limiter = RateLimiter::new(10, Duration::from_secs(1), 1.1);
//! let _permit = limiter.acquire().await;
//! let page = source.fetch(1, 500, &QueryParams::new()).await?;
//! ```

pub mod error;
pub mod http;
pub mod rate_limiter;
pub mod retry;
pub mod source;

pub use error::FetchError;
pub use http::{HttpSource, HttpSourceBuilder};
pub use rate_limiter::{RateLimiter, RatePermit};
pub use retry::RetryStrategy;
pub use source::{QueryParams, Source, BULK_PAGE_SIZE};
