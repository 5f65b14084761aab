//! CLI command implementations.

pub mod checkpoints;
pub mod reset;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use harvest_store::{CheckpointStore, HarvestConfig, MetadataRegistry};
use tracing::debug;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Loads the config file (if any), overlays `HARVEST_*` variables and validates.
pub async fn load_config(cli: &Cli) -> Result<HarvestConfig> {
    let config = match &cli.config {
        Some(path) => HarvestConfig::load_from(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?,
        None => HarvestConfig::default(),
    };
    let config = config
        .overlay(|name| std::env::var(name).ok())
        .context("reading HARVEST_* environment")?;
    config.validate().context("invalid configuration")?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

/// Opens the registry named by `config`.
pub async fn open_registry(config: &HarvestConfig) -> Result<MetadataRegistry> {
    MetadataRegistry::open(&config.metadata_path, config.page_size)
        .await
        .with_context(|| format!("opening registry {}", config.metadata_path.display()))
}

/// Checkpoint store named by `config`.
pub fn checkpoint_store(config: &HarvestConfig) -> CheckpointStore {
    CheckpointStore::new(&config.checkpoint_dir)
}

/// Prints `text` or the JSON rendering of `value`, per `--format`.
pub fn emit<T: serde::Serialize>(cli: &Cli, value: &T, text: impl FnOnce(&TextFormatter) -> String) -> Result<()> {
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", text(&formatter));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(value)?);
        }
    }
    Ok(())
}
