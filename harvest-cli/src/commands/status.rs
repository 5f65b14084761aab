//! Status commands - registry inspection.

use anyhow::Result;
use clap::Args;
use harvest_store::StoreError;

use super::{emit, load_config, open_registry};
use crate::output::{EndpointOutput, NamesOutput, StatusOutput};
use crate::Cli;

/// Arguments for the status command.
#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Show one endpoint in detail.
    #[arg(long, short)]
    pub endpoint: Option<String>,
}

/// Arguments for the stale command.
#[derive(Args, Debug, Default)]
pub struct StaleArgs {
    /// Maximum age of the last successful run (defaults to the configured value).
    #[arg(long)]
    pub max_age_hours: Option<f64>,
}

/// Runs the status command.
pub async fn run(args: &StatusArgs, cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let registry = open_registry(&config).await?;

    if let Some(name) = &args.endpoint {
        let entry = registry
            .get_endpoint(name)
            .await
            .ok_or_else(|| StoreError::EndpointNotFound(name.clone()))?;
        let output = EndpointOutput::new(name, &entry);
        return emit(cli, &output, |f| f.format_endpoint(&output));
    }

    let mut endpoints = Vec::new();
    for name in registry.endpoint_names().await {
        if let Some(entry) = registry.get_endpoint(&name).await {
            endpoints.push(EndpointOutput::new(&name, &entry));
        }
    }
    let output = StatusOutput {
        registry: config.metadata_path.display().to_string(),
        summary: registry.summary().await,
        endpoints,
    };
    emit(cli, &output, |f| f.format_status(&output))
}

/// Runs the incomplete command.
pub async fn run_incomplete(cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let registry = open_registry(&config).await?;

    let output = NamesOutput {
        title: "Incomplete endpoints".to_string(),
        names: registry.get_incomplete_endpoints().await,
    };
    emit(cli, &output, |f| f.format_names(&output))
}

/// Runs the stale command.
pub async fn run_stale(args: &StaleArgs, cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let registry = open_registry(&config).await?;
    let max_age_hours = args.max_age_hours.unwrap_or(config.max_age_hours);

    let output = NamesOutput {
        title: format!("Endpoints older than {max_age_hours}h"),
        names: registry.get_stale_endpoints(max_age_hours).await,
    };
    emit(cli, &output, |f| f.format_names(&output))
}
