//! Append-only assembly event store
//!
//! The only component that writes. Appends are not validated here; callers
//! go through [`ConnectionValidator`](super::ConnectionValidator), which
//! wraps its checks and the append in one [`LedgerTxn`].

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::types::{AssemblyEvent, PendingEvent};
use crate::{Error, Result};

const EVENT_COLUMNS: &str = "sequence_id, part_id, part_type, polarization, event_time, \
     peer_id, peer_type, peer_polarization, peer_event_time, status";

/// Handle on the assembly_events table
#[derive(Debug, Clone)]
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append one event and return its sequence id
    ///
    /// Visible to every read issued after this returns.
    pub async fn append(&self, event: &PendingEvent) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        append_on(&mut conn, event).await
    }

    /// All events naming `part_id` as either endpoint, in arrival order
    pub async fn events_touching(&self, part_id: &str) -> Result<Vec<AssemblyEvent>> {
        let mut conn = self.pool.acquire().await?;
        events_touching_on(&mut conn, part_id).await
    }

    /// Every event in arrival order
    pub async fn all_events(&self) -> Result<Vec<AssemblyEvent>> {
        let mut conn = self.pool.acquire().await?;
        all_events_on(&mut conn).await
    }

    /// Number of events in the ledger
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assembly_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Start a write transaction holding the database write lock
    ///
    /// `BEGIN IMMEDIATE` takes the lock up front, so a second writer blocks
    /// (up to the busy timeout) before it can read state this transaction is
    /// about to change.
    pub async fn begin_immediate(&self) -> Result<LedgerTxn> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(LedgerTxn { conn: Some(conn) })
    }
}

/// Exclusive write transaction on the ledger
///
/// Must be ended with [`finish`](Self::finish), [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). If dropped while open the connection is
/// detached from the pool and closed, which makes SQLite roll back.
pub struct LedgerTxn {
    conn: Option<PoolConnection<Sqlite>>,
}

impl LedgerTxn {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        match self.conn.as_mut() {
            Some(conn) => &mut **conn,
            None => unreachable!("LedgerTxn used after it was finished"),
        }
    }

    pub async fn commit(mut self) -> Result<()> {
        self.end("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.end("ROLLBACK").await
    }

    /// Run the closing statement; a connection whose transaction could not
    /// be closed never goes back to the pool
    async fn end(&mut self, statement: &'static str) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        match sqlx::query(statement).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("{} failed ({}); closing connection to roll back", statement, e);
                drop(conn.detach());
                Err(e.into())
            }
        }
    }

    /// Commit on `Ok`, roll back on `Err`, and pass the result through
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!("Rollback after failed ledger write also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

impl Drop for LedgerTxn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Ledger transaction dropped while open; closing connection to roll back");
            drop(conn.detach());
        }
    }
}

pub(crate) async fn append_on(conn: &mut SqliteConnection, event: &PendingEvent) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO assembly_events (
            part_id, part_type, polarization, event_time,
            peer_id, peer_type, peer_polarization, peer_event_time, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.part_id)
    .bind(&event.part_type)
    .bind(event.polarization.as_str())
    .bind(format_time(&event.event_time))
    .bind(&event.peer_id)
    .bind(&event.peer_type)
    .bind(event.peer_polarization.as_str())
    .bind(format_time(&event.peer_event_time))
    .bind(event.status.as_str())
    .execute(&mut *conn)
    .await?;

    let sequence_id = result.last_insert_rowid();
    debug!(
        sequence_id,
        part = %event.part_id,
        peer = %event.peer_id,
        status = %event.status,
        "Appended assembly event"
    );
    Ok(sequence_id)
}

pub(crate) async fn events_touching_on(
    conn: &mut SqliteConnection,
    part_id: &str,
) -> Result<Vec<AssemblyEvent>> {
    let sql = format!(
        "SELECT {} FROM assembly_events WHERE part_id = ? OR peer_id = ? ORDER BY sequence_id",
        EVENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(part_id)
        .bind(part_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(event_from_row).collect()
}

pub(crate) async fn all_events_on(conn: &mut SqliteConnection) -> Result<Vec<AssemblyEvent>> {
    let sql = format!(
        "SELECT {} FROM assembly_events ORDER BY sequence_id",
        EVENT_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

    rows.iter().map(event_from_row).collect()
}

/// Fixed-width RFC 3339 so stored times also sort lexically
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(sequence_id: i64, column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            Error::Internal(format!(
                "Event {} has unparseable {} '{}': {}",
                sequence_id, column, value, e
            ))
        })
}

fn event_from_row(row: &SqliteRow) -> Result<AssemblyEvent> {
    let sequence_id: i64 = row.get("sequence_id");
    let event_time: String = row.get("event_time");
    let peer_event_time: String = row.get("peer_event_time");
    let polarization: String = row.get("polarization");
    let peer_polarization: String = row.get("peer_polarization");
    let status: String = row.get("status");

    Ok(AssemblyEvent {
        sequence_id,
        part_id: row.get("part_id"),
        part_type: row.get("part_type"),
        polarization: polarization.parse()?,
        event_time: parse_time(sequence_id, "event_time", &event_time)?,
        peer_id: row.get("peer_id"),
        peer_type: row.get("peer_type"),
        peer_polarization: peer_polarization.parse()?,
        peer_event_time: parse_time(sequence_id, "peer_event_time", &peer_event_time)?,
        status: status.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use crate::ledger::types::{ConnectionStatus, Polarization};
    use chrono::TimeZone;

    fn pending(part: &str, peer: &str, secs: i64, status: ConnectionStatus) -> PendingEvent {
        let t = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        PendingEvent {
            part_id: part.to_string(),
            part_type: "Antenna".to_string(),
            polarization: Polarization::P1,
            event_time: t,
            peer_id: peer.to_string(),
            peer_type: "Amplifier".to_string(),
            peer_polarization: Polarization::P1,
            peer_event_time: t,
            status,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequence_ids() {
        let log = EventLog::new(init_memory_database().await.unwrap());

        let a = log.append(&pending("ANT001", "LNA001", 0, ConnectionStatus::Connected)).await.unwrap();
        let b = log.append(&pending("ANT002", "LNA002", 0, ConnectionStatus::Connected)).await.unwrap();
        assert!(b > a);
        assert_eq!(log.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_events_touching_either_endpoint_in_arrival_order() {
        let log = EventLog::new(init_memory_database().await.unwrap());

        log.append(&pending("ANT001", "LNA001", 10, ConnectionStatus::Connected)).await.unwrap();
        log.append(&pending("ANT002", "LNA002", 0, ConnectionStatus::Connected)).await.unwrap();
        log.append(&pending("LNA001", "CBL001", 5, ConnectionStatus::Connected)).await.unwrap();

        let events = log.events_touching("LNA001").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].part_id, "ANT001");
        assert_eq!(events[1].part_id, "LNA001");
        assert!(events[0].sequence_id < events[1].sequence_id);

        assert!(log.events_touching("NOPE").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trips_all_fields() {
        let log = EventLog::new(init_memory_database().await.unwrap());
        let mut event = pending("ANT001", "LNA001", 0, ConnectionStatus::Disconnected);
        event.peer_polarization = Polarization::P2;
        event.event_time = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();

        let seq = log.append(&event).await.unwrap();
        let all = log.all_events().await.unwrap();
        assert_eq!(all.len(), 1);

        let stored = &all[0];
        assert_eq!(stored.sequence_id, seq);
        assert_eq!(stored.event_time, event.event_time);
        assert_eq!(stored.peer_polarization, Polarization::P2);
        assert_eq!(stored.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_event() {
        let log = EventLog::new(init_memory_database().await.unwrap());

        let mut txn = log.begin_immediate().await.unwrap();
        append_on(txn.conn(), &pending("ANT001", "LNA001", 0, ConnectionStatus::Connected))
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        assert!(log.is_empty().await.unwrap());

        let mut txn = log.begin_immediate().await.unwrap();
        let result = append_on(txn.conn(), &pending("ANT001", "LNA001", 0, ConnectionStatus::Connected)).await;
        txn.finish(result).await.unwrap();

        assert_eq!(log.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_does_not_leak_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init::init_database(&dir.path().join("hwa.db")).await.unwrap();
        let log = EventLog::new(pool.clone());

        // Deferred foreign key: the violation only surfaces at COMMIT,
        // which then fails and leaves the transaction open
        sqlx::query("CREATE TABLE fk_parent (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE fk_child (parent_id INTEGER REFERENCES fk_parent(id) DEFERRABLE INITIALLY DEFERRED)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut txn = log.begin_immediate().await.unwrap();
        append_on(txn.conn(), &pending("ANT001", "LNA001", 0, ConnectionStatus::Connected))
            .await
            .unwrap();
        sqlx::query("INSERT INTO fk_child (parent_id) VALUES (42)")
            .execute(&mut *txn.conn())
            .await
            .unwrap();
        assert!(txn.commit().await.is_err());

        // Write lock released and nothing from the failed transaction kept
        let mut txn = log.begin_immediate().await.unwrap();
        let result = append_on(txn.conn(), &pending("ANT002", "LNA002", 1, ConnectionStatus::Connected)).await;
        txn.finish(result).await.unwrap();

        let events = log.all_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].part_id, "ANT002");

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fk_child")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
