//! hwa-dr (Data Review) - read-only assembly ledger service
//!
//! Serves the chain report, port resolution and part history for the
//! visualization layer. Opens the ledger read-only.

use anyhow::{Context, Result};
use clap::Parser;
use hwa_common::config::LedgerConfig;
use hwa_dr::{build_router, AppState};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hwa-dr
#[derive(Parser, Debug)]
#[command(name = "hwa-dr")]
#[command(about = "Read-only review service for the hardware assembly ledger")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5790", env = "HWA_DR_PORT")]
    port: u16,

    /// Root folder holding hwa.db
    #[arg(short, long, env = "HWA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file
    #[arg(short, long, env = "HWA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = LedgerConfig::resolve(args.root_folder.as_deref(), args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hwa-dr v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match hwa_dr::db::connect_readonly(&db_path).await {
        Ok(pool) => {
            info!("Connected to database (read-only)");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e);
        }
    };

    let state = AppState::new(pool, config.part_types.clone(), config.ports_per_board);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("hwa-dr listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
