mod analysis;
mod auth;
mod cli;
mod config;
mod dashboard;
mod error;
mod models;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting SQUASH - Science Quality Analysis Harness");
    cli.execute().await?;

    Ok(())
}
