//! Harvester CLI: collect, clean, validate, and merge business listings.
//!
//! Runs single pipeline stages on demand or the recurring schedule.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
