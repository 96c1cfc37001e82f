//! SQLite schema definitions.

use rusqlite::Connection;

use crate::error::{BackendError, StoreResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Safe to call more than once; an already-initialized database is left
/// untouched.
pub fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> StoreResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(BackendError::sql("create schema_version table"))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StoreResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(BackendError::sql("clear schema_version"))?;

    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )
    .map_err(BackendError::sql("set schema_version"))?;

    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> StoreResult<()> {
    // Current state, one row per live object. The guid changes on every
    // write so history rows can reference the exact write instance.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resource (
            guid TEXT NOT NULL,
            group_name TEXT NOT NULL,
            resource TEXT NOT NULL,
            namespace TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            value BLOB NOT NULL,
            resource_version INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_name, resource, namespace, name)
        )",
        [],
    )
    .map_err(BackendError::sql("create resource table"))?;

    // Append-only history, one row per mutation.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resource_history (
            guid TEXT NOT NULL PRIMARY KEY,
            group_name TEXT NOT NULL,
            resource TEXT NOT NULL,
            namespace TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            value BLOB NOT NULL,
            action TEXT NOT NULL,
            resource_version INTEGER NOT NULL DEFAULT 0,
            previous_resource_version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .map_err(BackendError::sql("create resource_history table"))?;

    // Version counters, one row per (group, resource, shard).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resource_version (
            group_name TEXT NOT NULL,
            resource TEXT NOT NULL,
            shard INTEGER NOT NULL,
            resource_version INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_name, resource, shard)
        )",
        [],
    )
    .map_err(BackendError::sql("create resource_version table"))?;

    create_indexes(conn)
}

/// Create indexes for efficient queries.
fn create_indexes(conn: &Connection) -> StoreResult<()> {
    let indexes = [
        // Version stamping locates rows by guid.
        "CREATE INDEX IF NOT EXISTS idx_resource_guid ON resource(guid)",
        // Change-feed polling scans a pair by version.
        "CREATE INDEX IF NOT EXISTS idx_history_pair_version
            ON resource_history(group_name, resource, resource_version)",
        // At-revision reads and listings locate revisions by key.
        "CREATE INDEX IF NOT EXISTS idx_history_key_version
            ON resource_history(group_name, resource, namespace, name, resource_version)",
    ];

    for index_sql in &indexes {
        conn.execute(index_sql, [])
            .map_err(BackendError::sql("create index"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["resource", "resource_history", "resource_version"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
