//! Configuration management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{default_checkpoint_dir, default_metadata_path, load_json_opt, save_json};

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "HARVEST_";

/// Extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Requests allowed per period.
    pub calls_per_period: u32,
    /// Rate limit period in seconds.
    pub period_seconds: f64,
    /// Multiplier applied to the minimum interval between requests.
    pub safety_buffer: f64,
    /// Page size used by the paginated fallback.
    pub page_size: u32,
    /// Records buffered before a flush to the sink.
    pub batch_size: usize,
    /// Directory holding checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Path of the metadata registry document.
    pub metadata_path: PathBuf,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base retry delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Whether to try a single bulk request first.
    pub bulk_enabled: bool,
    /// Pages fetched concurrently when the total is known.
    pub page_concurrency: usize,
    /// Consecutive failed pages tolerated when the total is unknown.
    pub max_consecutive_failures: u32,
    /// Age after which a successful extraction is stale.
    pub max_age_hours: f64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            calls_per_period: 10,
            period_seconds: 1.0,
            safety_buffer: 1.1,
            page_size: 2000,
            batch_size: 1000,
            checkpoint_dir: default_checkpoint_dir(),
            metadata_path: default_metadata_path(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            bulk_enabled: true,
            page_concurrency: 1,
            max_consecutive_failures: 3,
            max_age_hours: 24.0,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, StoreError> {
    raw.trim()
        .parse()
        .map_err(|_| StoreError::Config(format!("invalid value for {name}: {raw:?}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, StoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Config(format!("invalid value for {name}: {raw:?}"))),
    }
}

impl HarvestConfig {
    /// Defaults overlaid with `HARVEST_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay(lookup)
    }

    /// Reads a JSON config file. A missing file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self, StoreError> {
        match load_json_opt::<Self>(path).await? {
            Some(config) => {
                info!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            None => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Writes this config as JSON.
    pub async fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        save_json(path, self).await
    }

    /// Applies every variable `lookup` knows about on top of `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((name, raw)) = var("CALLS_PER_PERIOD") {
            self.calls_per_period = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("PERIOD_SECONDS") {
            self.period_seconds = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("SAFETY_BUFFER") {
            self.safety_buffer = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("PAGE_SIZE") {
            self.page_size = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("BATCH_SIZE") {
            self.batch_size = parse_var(&name, &raw)?;
        }
        if let Some((_, raw)) = var("CHECKPOINT_DIR") {
            self.checkpoint_dir = PathBuf::from(raw);
        }
        if let Some((_, raw)) = var("METADATA_PATH") {
            self.metadata_path = PathBuf::from(raw);
        }
        if let Some((name, raw)) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("MAX_RETRIES") {
            self.max_retries = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("BULK_ENABLED") {
            self.bulk_enabled = parse_bool(&name, &raw)?;
        }
        if let Some((name, raw)) = var("PAGE_CONCURRENCY") {
            self.page_concurrency = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("MAX_CONSECUTIVE_FAILURES") {
            self.max_consecutive_failures = parse_var(&name, &raw)?;
        }
        if let Some((name, raw)) = var("MAX_AGE_HOURS") {
            self.max_age_hours = parse_var(&name, &raw)?;
        }

        Ok(self)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.calls_per_period == 0 {
            return Err(StoreError::Config("calls_per_period must be at least 1".into()));
        }
        if !(self.period_seconds > 0.0 && self.period_seconds.is_finite()) {
            return Err(StoreError::Config("period_seconds must be positive".into()));
        }
        if !(self.safety_buffer >= 1.0 && self.safety_buffer.is_finite()) {
            return Err(StoreError::Config("safety_buffer must be at least 1.0".into()));
        }
        if self.page_size == 0 {
            return Err(StoreError::Config("page_size must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(StoreError::Config("batch_size must be at least 1".into()));
        }
        if self.max_age_hours.is_nan() {
            return Err(StoreError::Config("max_age_hours must be a number".into()));
        }
        Ok(())
    }

    /// Rate limit period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_seconds.max(0.0))
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base retry delay.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Attempts per request, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
