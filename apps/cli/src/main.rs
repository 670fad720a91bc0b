//! stormtrack CLI — tropical-cyclone advisory ingestion tool.
//!
//! Mirrors GDACS cyclone advisories into a local queryable store, either as
//! a full backfill or an incremental update.

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
