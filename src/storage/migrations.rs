//! Database migrations for resync.
//!
//! Each migration upgrades the schema by one version. Migrations are
//! additive only and run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::StorageError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, StorageError> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), StorageError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version).map_err(|e| StorageError::Migration {
            version,
            reason: e.to_string(),
        })?;
        set_version(conn, version)?;
        tracing::info!(version, "applied schema migration");
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), StorageError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(StorageError::Migration {
            version,
            reason: "unknown migration version".to_string(),
        }),
    }
}

/// Migration v1: Initial schema.
///
/// Creates tables for:
/// - `offline_operations`: the durable operation queue
/// - `kv`: small key-value records (quick action usage, pins)
fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS offline_operations (
            id TEXT PRIMARY KEY,
            op_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            synced_at TEXT,
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_offline_operations_status
        ON offline_operations(status);

        CREATE INDEX IF NOT EXISTS idx_offline_operations_order
        ON offline_operations(created_at, id);

        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO offline_operations (id, op_type, payload, created_at)
             VALUES ('a1', 'capture-text', '{\"text\":\"hi\"}', '2024-01-01T10:00:00.000000Z')",
            [],
        )
        .unwrap();

        conn.execute("INSERT INTO kv (key, value) VALUES ('k', 'v')", [])
            .unwrap();

        let status: String = conn
            .query_row(
                "SELECT status FROM offline_operations WHERE id = 'a1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
