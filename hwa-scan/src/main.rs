//! hwa-scan - record and inspect signal chain assembly
//!
//! Exits non-zero on any error. Rule violations print the identifiers
//! involved so the technician can see which existing link is in the way.

use anyhow::{Context, Result};
use clap::Parser;
use hwa_common::config::LedgerConfig;
use hwa_scan::{execute, open_ledger, Cli};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LedgerConfig::resolve(cli.root_folder.as_deref(), cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Logs go to stderr; stdout carries the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "hwa-scan v{} using {}",
        env!("CARGO_PKG_VERSION"),
        config.database_path().display()
    );

    let ledger = open_ledger(&config).await?;
    execute(&cli.command, &ledger, &config, &mut std::io::stdout()).await
}
