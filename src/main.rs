//! FitQuota binary entry point.

mod cli;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let (config, ignored) = cli::load_config(cli.config.as_deref())?;
    cli::init_tracing(&config.log);
    for message in &ignored {
        tracing::warn!("{message}");
    }

    cli::run(cli.command, config).await
}
