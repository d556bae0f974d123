//! LeadFlow CLI — lead ingestion, deduplication, and enrichment tool.
//!
//! Drives the core pipelines: ingest scraped records, run the provider
//! waterfall, resolve duplicates, and rescore the store.

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
