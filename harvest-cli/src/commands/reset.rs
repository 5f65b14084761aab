//! Reset command - wipe the metadata registry.

use anyhow::{bail, Result};
use clap::Args;

use super::{load_config, open_registry};
use crate::Cli;

/// Arguments for the reset command.
#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Confirm the reset.
    #[arg(long)]
    pub yes: bool,
}

/// Runs the reset command.
pub async fn run(args: &ResetArgs, cli: &Cli) -> Result<()> {
    if !args.yes {
        bail!("reset drops all extraction history; pass --yes to confirm");
    }

    let config = load_config(cli).await?;
    let registry = open_registry(&config).await?;
    registry.reset().await?;

    if !cli.quiet {
        eprintln!("Registry {} reset", config.metadata_path.display());
    }
    Ok(())
}
