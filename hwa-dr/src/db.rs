//! Read-only database access for hwa-dr

use anyhow::{Context, Result};
use hwa_common::db::BUSY_TIMEOUT_MS;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Connect to the ledger database in read-only mode
///
/// The scanner keeps writing while the service runs, so the file is opened
/// `mode=ro` rather than `immutable=1`.
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}\nRun hwa-scan first to initialize the ledger.",
            db_path.display()
        );
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)
        .context("Invalid database path")?
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePool::connect_with(options)
        .await
        .context("Failed to connect to database in read-only mode")?;

    Ok(pool)
}
