//! Maintenance entrypoint for the page cache.

use cachify::ProcessMetrics;
use clap::Parser;
use shared::config::Config;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Commands, Defaults};

#[derive(Parser)]
#[command(name = "cachify-ctl")]
#[command(author, version, about = "Inspect and maintain the page cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables
    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let cli = Cli::parse();
    let config = Config::from_env();
    let defaults = Defaults {
        lifetime: config.lifetime,
        sig_detail: config.sig_detail,
    };

    let metrics = Arc::new(ProcessMetrics::new());
    let backend = storage_engine::create_backend(&config, metrics.clone())?;

    metrics.begin_request();

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let result = commands::run(
        cli.command,
        backend.as_ref(),
        &defaults,
        &mut stdin,
        &mut stdout,
    )
    .await;

    backend.close().await;

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
