//! Database initialization
//!
//! Opens (or creates) the ledger database, applies connection pragmas and
//! brings the schema up to date. Safe to call on every start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every pooled connection
///
/// Scanners and the review service share one file; a writer holding the
/// `BEGIN IMMEDIATE` lock is normally done within a few milliseconds.
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every connection to `sqlite::memory:` is its own database, so the pool is
/// capped at one connection that is never recycled.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and run pending migrations (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_assembly_events_table(pool).await?;
    create_board_config_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the assembly_events table
///
/// Append-only audit trail of every scan. `sequence_id` is the arrival order.
/// Times are RFC 3339 UTC strings with microsecond precision so they sort
/// lexically as well as chronologically.
pub async fn create_assembly_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assembly_events (
            sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
            part_id TEXT NOT NULL,
            part_type TEXT NOT NULL,
            polarization TEXT NOT NULL CHECK (polarization IN ('P1', 'P2')),
            event_time TEXT NOT NULL,
            peer_id TEXT NOT NULL,
            peer_type TEXT NOT NULL,
            peer_polarization TEXT NOT NULL CHECK (peer_polarization IN ('P1', 'P2')),
            peer_event_time TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('connected', 'disconnected')),
            recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the board_config table
///
/// One row per digitizer board, keyed by its chassis/slot position.
pub async fn create_board_config_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS board_config (
            chassis INTEGER NOT NULL CHECK (chassis BETWEEN 1 AND 4),
            slot TEXT NOT NULL CHECK (length(slot) = 1),
            ip_address TEXT NOT NULL,
            serial TEXT NOT NULL,
            engine_id INTEGER NOT NULL CHECK (engine_id >= 0),
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (chassis, slot)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_tables() {
        let pool = init_memory_database().await.unwrap();

        for table in ["schema_version", "assembly_events", "board_config"] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "table {} missing", table);
        }
    }

    #[tokio::test]
    async fn test_create_schema_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }
}
