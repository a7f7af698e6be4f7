//! Digitizer board configuration table
//!
//! Maps a chassis/slot position to the board installed there and the
//! network routing the correlator needs for it.

use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row, Sqlite, SqlitePool};
use std::path::Path;
use tracing::info;

use crate::{Error, Result};

/// One digitizer board installed at a chassis/slot position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub chassis: u8,
    pub slot: char,
    pub ip_address: String,
    pub serial: String,
    /// Logical correlator engine fed by this board
    pub engine_id: u32,
}

impl BoardConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.chassis) {
            return Err(Error::InvalidInput(format!(
                "Board chassis {} out of range 1-4",
                self.chassis
            )));
        }
        if !('A'..='K').contains(&self.slot) {
            return Err(Error::InvalidInput(format!(
                "Board slot '{}' out of range A-K",
                self.slot
            )));
        }
        if self.ip_address.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Board {}{} has no ip_address",
                self.chassis, self.slot
            )));
        }
        Ok(())
    }
}

/// Board list file layout (`[[board]]` array of tables)
#[derive(Debug, Deserialize)]
struct BoardsFile {
    #[serde(default)]
    board: Vec<BoardConfig>,
}

/// Access to the board_config table
#[derive(Debug, Clone)]
pub struct BoardConfigStore {
    pool: SqlitePool,
}

impl BoardConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the board at `(chassis, slot)`
    pub async fn upsert(&self, board: &BoardConfig) -> Result<()> {
        board.validate()?;

        upsert_query(board).execute(&self.pool).await?;

        Ok(())
    }

    /// Board at `(chassis, slot)`, if one is configured
    pub async fn lookup(&self, chassis: u8, slot: char) -> Result<Option<BoardConfig>> {
        let row = sqlx::query(
            "SELECT chassis, slot, ip_address, serial, engine_id FROM board_config WHERE chassis = ? AND slot = ?",
        )
        .bind(chassis as i64)
        .bind(slot.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| board_from_row(&r)).transpose()
    }

    /// All configured boards ordered by position
    pub async fn list(&self) -> Result<Vec<BoardConfig>> {
        let rows = sqlx::query(
            "SELECT chassis, slot, ip_address, serial, engine_id FROM board_config ORDER BY chassis, slot",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(board_from_row).collect()
    }

    /// Load a `[[board]]` TOML file into the table; returns the number of boards
    ///
    /// All boards are validated before any is written.
    pub async fn import_toml(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let file: BoardsFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid board file {}: {}", path.display(), e)))?;

        for board in &file.board {
            board.validate()?;
        }

        let mut tx = self.pool.begin().await?;
        for board in &file.board {
            upsert_query(board).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Imported {} boards from {}", file.board.len(), path.display());
        Ok(file.board.len())
    }
}

fn upsert_query(board: &BoardConfig) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO board_config (chassis, slot, ip_address, serial, engine_id)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chassis, slot) DO UPDATE SET
            ip_address = excluded.ip_address,
            serial = excluded.serial,
            engine_id = excluded.engine_id,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(board.chassis as i64)
    .bind(board.slot.to_string())
    .bind(&board.ip_address)
    .bind(&board.serial)
    .bind(board.engine_id as i64)
}

fn board_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BoardConfig> {
    let slot: String = row.get("slot");
    let slot = slot
        .chars()
        .next()
        .ok_or_else(|| Error::Internal("board_config row with empty slot".to_string()))?;
    let chassis: i64 = row.get("chassis");
    let engine_id: i64 = row.get("engine_id");

    Ok(BoardConfig {
        chassis: u8::try_from(chassis)
            .map_err(|_| Error::Internal(format!("board_config chassis {} out of range", chassis)))?,
        slot,
        ip_address: row.get("ip_address"),
        serial: row.get("serial"),
        engine_id: u32::try_from(engine_id)
            .map_err(|_| Error::Internal(format!("board_config engine_id {} out of range", engine_id)))?,
    })
}
