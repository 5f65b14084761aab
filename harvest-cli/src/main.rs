// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Harvest CLI - resumable extraction of paginated HTTP data.
//!
//! # Examples
//!
//! ```bash
//! # Extract an endpoint into ./out/orders.jsonl
//! harvest run orders --url https://api.example.com/v1/orders --out-dir out
//!
//! # Pass extra query parameters and skip the bulk attempt
//! harvest run orders --url https://api.example.com/v1/orders --param status=open --no-bulk
//!
//! # Registry overview
//! harvest status
//!
//! # Endpoints needing attention
//! harvest incomplete
//! harvest stale --max-age-hours 12
//!
//! # Interrupted runs
//! harvest checkpoints
//! harvest checkpoints --clear orders_all
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{checkpoints, reset, run, status};

// ============================================================================
// CLI Definition
// ============================================================================

/// Harvest CLI - resumable, rate-limited extraction.
#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable, rate-limited extraction of paginated HTTP data")]
#[command(long_about = r#"
Harvest pulls records from paginated HTTP endpoints into JSON Lines files.

Each run first asks for everything in one request and falls back to paging.
Progress is checkpointed so an interrupted run resumes where it stopped, and
every run is recorded in a metadata registry that tracks completeness and
freshness per endpoint.

Settings come from an optional JSON config file and HARVEST_* environment
variables (a .env file in the working directory is read too).

Examples:
  harvest run orders --url https://api.example.com/v1/orders
  harvest status --endpoint orders
  harvest stale --max-age-hours 12
  harvest checkpoints --clear orders_all
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// JSON config file.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging, errors only via exit code).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Extract one endpoint.
    #[command(visible_alias = "r")]
    Run(run::RunArgs),

    /// Show registry state.
    #[command(visible_alias = "s")]
    Status(status::StatusArgs),

    /// List endpoints whose latest run is incomplete.
    Incomplete,

    /// List endpoints without a recent successful run.
    Stale(status::StaleArgs),

    /// List or clear checkpoints of interrupted runs.
    Checkpoints(checkpoints::CheckpointsArgs),

    /// Drop every registry entry.
    Reset(reset::ResetArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// General error.
    Error = 1,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("harvest=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harvest=info,warn"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Run(args) => run::run(args, &cli).await,
        Commands::Status(args) => status::run(args, &cli).await,
        Commands::Incomplete => status::run_incomplete(&cli).await,
        Commands::Stale(args) => status::run_stale(args, &cli).await,
        Commands::Checkpoints(args) => checkpoints::run(args, &cli).await,
        Commands::Reset(args) => reset::run(args, &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::Error as i32);
    }

    Ok(())
}
