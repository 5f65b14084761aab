//! Run command - extract one endpoint.

use anyhow::{bail, Context, Result};
use clap::Args;
use harvest_engine::{ExtractionEngine, ExtractionJob, DEFAULT_VARIANT};
use harvest_fetch::{HttpSource, QueryParams};
use harvest_store::{default_data_dir, JsonLinesSink, MemorySink, Sink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{emit, load_config, open_registry};
use crate::output::RunOutput;
use crate::Cli;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Logical endpoint name (registry key).
    pub endpoint: String,

    /// Endpoint URL.
    #[arg(long, short)]
    pub url: String,

    /// Data category recorded in the registry.
    #[arg(long, default_value = "default")]
    pub category: String,

    /// Output name (defaults to the endpoint name).
    #[arg(long, short)]
    pub output: Option<String>,

    /// Variant, part of the checkpoint key.
    #[arg(long, default_value = DEFAULT_VARIANT)]
    pub variant: String,

    /// Extra query parameter, repeatable.
    #[arg(long = "param", short = 'p', value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Run even if the last extraction is complete and fresh.
    #[arg(long)]
    pub force: bool,

    /// Skip the single-request bulk attempt.
    #[arg(long)]
    pub no_bulk: bool,

    /// Environment variable holding a bearer API key.
    #[arg(long)]
    pub api_key_env: Option<String>,

    /// Query parameter carrying the page number.
    #[arg(long, default_value = "page")]
    pub page_param: String,

    /// Query parameter carrying the page size.
    #[arg(long, default_value = "page_size")]
    pub page_size_param: String,

    /// Directory for JSON Lines output.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Keep records in memory instead of writing files.
    #[arg(long)]
    pub dry_run: bool,
}

/// Parses `key=value`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

/// Runs the run command.
pub async fn run(args: &RunArgs, cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let registry = Arc::new(open_registry(&config).await?);

    let mut source = HttpSource::builder(&args.url)
        .id(&args.endpoint)
        .page_param(&args.page_param)
        .page_size_param(&args.page_size_param)
        .timeout(config.request_timeout());
    if let Some(name) = &args.api_key_env {
        source = source.api_key_env(name);
    }
    let source = source.build().context("invalid source")?;

    let output_name = args.output.clone().unwrap_or_else(|| args.endpoint.clone());
    let sink: Arc<dyn Sink> = if args.dry_run {
        Arc::new(MemorySink::new())
    } else {
        let dir = args
            .out_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("output"));
        info!(dir = %dir.display(), "Writing JSON Lines output");
        Arc::new(JsonLinesSink::new(dir))
    };

    let engine = ExtractionEngine::builder(Arc::new(source), sink, registry)
        .config(config)
        .build()?;

    let params: QueryParams = args.params.iter().cloned().collect();
    if params.len() != args.params.len() {
        bail!("duplicate --param keys");
    }
    let job = ExtractionJob::new(&args.endpoint, &args.category, output_name)
        .with_variant(&args.variant)
        .with_params(params)
        .with_bulk(!args.no_bulk)
        .force(args.force);

    let outcome = engine.run(&job).await?;
    let output = RunOutput::new(&args.endpoint, &outcome);
    emit(cli, &output, |f| f.format_run(&output))
}
