//! Database schema migrations
//!
//! Versioned, idempotent schema changes applied after the base tables exist.
//! The current version is tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - ledgers in the field were upgraded by them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Never rewrite assembly_events rows** - the ledger is an audit trail

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: endpoint lookup indexes on assembly_events
///
/// `events_touching` filters on either endpoint column; without these every
/// validation is a full scan of the ledger.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: assembly_events endpoint indexes");

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assembly_events_part_id ON assembly_events(part_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assembly_events_peer_id ON assembly_events(peer_id)",
    )
    .execute(pool)
    .await?;

    info!("  ✓ Created part_id and peer_id indexes");
    Ok(())
}

/// Migration v2: make assembly_events append-only at the storage layer
///
/// UPDATE and DELETE abort inside SQLite itself, so no tool sharing the file
/// can rewrite history.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: append-only triggers on assembly_events");

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS assembly_events_no_update
        BEFORE UPDATE ON assembly_events
        BEGIN
            SELECT RAISE(ABORT, 'assembly_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS assembly_events_no_delete
        BEFORE DELETE ON assembly_events
        BEGIN
            SELECT RAISE(ABORT, 'assembly_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    info!("  ✓ Installed append-only triggers");
    Ok(())
}
