//! Checkpoints command - list or clear resume state.

use anyhow::{bail, Result};
use clap::Args;

use super::{checkpoint_store, emit, load_config};
use crate::output::CheckpointsOutput;
use crate::Cli;

/// Arguments for the checkpoints command.
#[derive(Args, Debug, Default)]
pub struct CheckpointsArgs {
    /// Remove the checkpoint of this extraction id.
    #[arg(long)]
    pub clear: Option<String>,
}

/// Runs the checkpoints command.
pub async fn run(args: &CheckpointsArgs, cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let store = checkpoint_store(&config);

    if let Some(id) = &args.clear {
        if !store.clear(id).await? {
            bail!("no checkpoint for {id}");
        }
        if !cli.quiet {
            eprintln!("Cleared checkpoint {id}");
        }
        return Ok(());
    }

    let output = CheckpointsOutput {
        dir: store.dir().display().to_string(),
        checkpoints: store.list_all().await?,
    };
    emit(cli, &output, |f| f.format_checkpoints(&output))
}
