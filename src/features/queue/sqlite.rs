//! `SQLite`-backed queue store.
//!
//! Records live in the `offline_operations` table. Ordering uses the
//! `(created_at, id)` index; timestamps are stored as fixed-width RFC 3339
//! strings so lexicographic order is chronological.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::operation::{
    format_timestamp, parse_timestamp, OfflineOperation, OperationId, OperationStatus, PageCursor,
};
use super::store::{QueueStats, QueueStore};
use crate::error::StorageError;
use crate::storage::Database;

const SELECT_COLUMNS: &str =
    "SELECT id, op_type, payload, status, retry_count, created_at, synced_at, error
     FROM offline_operations";

/// Queue store persisted in the resync database.
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    db: Database,
}

impl SqliteQueueStore {
    /// Create a store over an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a store over a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<OfflineOperation>, StorageError> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, RawRow::from_row)?;

            let mut operations = Vec::new();
            for row in rows {
                operations.push(row?.decode()?);
            }
            Ok(operations)
        })
    }
}

impl QueueStore for SqliteQueueStore {
    fn put(&self, op: &OfflineOperation) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&op.payload)?;

        self.db.with_connection(|conn| {
            // Upsert rather than REPLACE so the row keeps its identity
            conn.execute(
                r"INSERT INTO offline_operations
                    (id, op_type, payload, status, retry_count, created_at, synced_at, error)
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                  ON CONFLICT(id) DO UPDATE SET
                    op_type = excluded.op_type,
                    payload = excluded.payload,
                    status = excluded.status,
                    retry_count = excluded.retry_count,
                    created_at = excluded.created_at,
                    synced_at = excluded.synced_at,
                    error = excluded.error",
                params![
                    op.id.to_string(),
                    op.op_type.as_str(),
                    payload,
                    op.status.as_str(),
                    op.retry_count,
                    format_timestamp(&op.created_at),
                    op.synced_at.as_ref().map(format_timestamp),
                    op.error,
                ],
            )?;
            Ok(())
        })
    }

    fn get(&self, id: &OperationId) -> Result<Option<OfflineOperation>, StorageError> {
        let raw = self.db.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    [id.to_string()],
                    RawRow::from_row,
                )
                .optional()?)
        })?;

        raw.map(RawRow::decode).transpose()
    }

    fn list_pending(
        &self,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<OfflineOperation>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        match after {
            None => self.query(
                &format!(
                    "{SELECT_COLUMNS} WHERE status != 'completed'
                     ORDER BY created_at ASC, id ASC LIMIT ?1"
                ),
                &[&limit],
            ),
            Some(cursor) => {
                let created_at = format_timestamp(&cursor.created_at);
                let id = cursor.id.to_string();
                self.query(
                    &format!(
                        "{SELECT_COLUMNS} WHERE status != 'completed'
                           AND (created_at > ?1 OR (created_at = ?1 AND id > ?2))
                         ORDER BY created_at ASC, id ASC LIMIT ?3"
                    ),
                    &[&created_at, &id, &limit],
                )
            }
        }
    }

    fn count(&self) -> Result<u64, StorageError> {
        self.db.with_connection(|conn| {
            // Served from an index; payloads are never read
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM offline_operations", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn delete(&self, id: &OperationId) -> Result<bool, StorageError> {
        self.db.with_connection(|conn| {
            let rows = conn.execute(
                "DELETE FROM offline_operations WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(rows > 0)
        })
    }

    fn list_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<OfflineOperation>, StorageError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at ASC, id ASC"),
            &[&status.as_str()],
        )
    }

    fn stats(&self) -> Result<QueueStats, StorageError> {
        self.db.with_connection(|conn| {
            let mut stats = QueueStats::default();

            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM offline_operations GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            for row in rows {
                let (status, count) = row?;
                let count = u64::try_from(count).unwrap_or_default();
                match status.parse::<OperationStatus>() {
                    Ok(OperationStatus::Pending) => stats.pending = count,
                    Ok(OperationStatus::Syncing) => stats.syncing = count,
                    Ok(OperationStatus::Completed) => stats.completed = count,
                    Ok(OperationStatus::Failed) => stats.failed = count,
                    Err(reason) => {
                        return Err(StorageError::Corrupt {
                            id: format!("status:{status}"),
                            reason,
                        })
                    }
                }
            }

            let oldest: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM offline_operations
                     WHERE status != 'completed'
                     ORDER BY created_at ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            stats.oldest_pending = oldest.and_then(|s| parse_timestamp(&s).ok());
            Ok(stats)
        })
    }

    fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.db.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM offline_operations WHERE status = 'completed' AND created_at < ?1",
                [format_timestamp(&cutoff)],
            )?)
        })
    }

    fn clear(&self) -> Result<usize, StorageError> {
        self.db
            .with_connection(|conn| Ok(conn.execute("DELETE FROM offline_operations", [])?))
    }
}

/// Row as stored, before validation.
struct RawRow {
    id: String,
    op_type: String,
    payload: String,
    status: String,
    retry_count: u32,
    created_at: String,
    synced_at: Option<String>,
    error: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            op_type: row.get(1)?,
            payload: row.get(2)?,
            status: row.get(3)?,
            retry_count: row.get(4)?,
            created_at: row.get(5)?,
            synced_at: row.get(6)?,
            error: row.get(7)?,
        })
    }

    fn decode(self) -> Result<OfflineOperation, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = self
            .id
            .parse::<OperationId>()
            .map_err(|e| corrupt(e.to_string()))?;
        let op_type = self.op_type.parse().map_err(corrupt)?;
        let status = self.status.parse().map_err(corrupt)?;
        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let synced_at = self
            .synced_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt)?;
        let payload = serde_json::from_str(&self.payload)?;

        Ok(OfflineOperation {
            id,
            op_type,
            payload,
            status,
            retry_count: self.retry_count,
            created_at,
            synced_at,
            error: self.error,
        })
    }
}
