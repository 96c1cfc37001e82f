//! Write pipeline: create, update, and delete as history-logging transactions.
//!
//! Every mutation runs as one IMMEDIATE transaction: mutate the current-state
//! row under a fresh guid, append the history row, draw the next version from
//! the ledger, and stamp it onto both rows before committing. Update and
//! delete follow the exact same path as create; the history table is the
//! single source of truth for ordering and change-feed delivery, regardless
//! of operation kind.

use rusqlite::{Connection, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{BackendError, StoreResult};
use crate::types::{ResourceKey, WriteEvent};

use super::SqliteBackend;
use super::version;

impl SqliteBackend {
    /// Applies an ADDED event.
    pub(super) fn create(&self, event: &WriteEvent) -> StoreResult<i64> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(BackendError::sql("begin transaction"))?;

        let guid = Uuid::new_v4().to_string();
        let key = &event.key;

        tx.execute(
            "INSERT INTO resource (guid, group_name, resource, namespace, name, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![guid, key.group, key.resource, key.namespace, key.name, event.value],
        )
        .map_err(BackendError::sql("insert into resource"))?;

        insert_history(&tx, &guid, event)?;

        let rv = self.next_version(&tx, key)?;

        stamp_history_version(&tx, &guid, rv)?;
        stamp_resource_version(&tx, &guid, rv)?;

        tx.commit()
            .map_err(BackendError::sql("commit transaction"))?;
        Ok(rv)
    }

    /// Applies a MODIFIED event.
    pub(super) fn update(&self, event: &WriteEvent) -> StoreResult<i64> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(BackendError::sql("begin transaction"))?;

        let guid = Uuid::new_v4().to_string();
        let key = &event.key;

        tx.execute(
            "UPDATE resource SET guid = ?1, value = ?2
             WHERE group_name = ?3 AND resource = ?4 AND namespace = ?5 AND name = ?6",
            params![guid, event.value, key.group, key.resource, key.namespace, key.name],
        )
        .map_err(BackendError::sql("update resource"))?;

        insert_history(&tx, &guid, event)?;

        let rv = self.next_version(&tx, key)?;

        stamp_history_version(&tx, &guid, rv)?;
        stamp_resource_version(&tx, &guid, rv)?;

        tx.commit()
            .map_err(BackendError::sql("commit transaction"))?;
        Ok(rv)
    }

    /// Applies a DELETED event.
    ///
    /// The current-state row is removed; only the history row carries the
    /// tombstone and receives the version stamp.
    pub(super) fn delete(&self, event: &WriteEvent) -> StoreResult<i64> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(BackendError::sql("begin transaction"))?;

        let guid = Uuid::new_v4().to_string();
        let key = &event.key;

        tx.execute(
            "DELETE FROM resource
             WHERE group_name = ?1 AND resource = ?2 AND namespace = ?3 AND name = ?4",
            params![key.group, key.resource, key.namespace, key.name],
        )
        .map_err(BackendError::sql("delete from resource"))?;

        insert_history(&tx, &guid, event)?;

        let rv = self.next_version(&tx, key)?;

        stamp_history_version(&tx, &guid, rv)?;

        tx.commit()
            .map_err(BackendError::sql("commit transaction"))?;
        Ok(rv)
    }

    fn next_version(&self, conn: &Connection, key: &ResourceKey) -> StoreResult<i64> {
        version::next_version(
            conn,
            key,
            self.config().shard_count,
            self.contention_delay(),
            self.epoch.as_ref(),
        )
    }

    /// Best-effort shard convergence after a committed write.
    ///
    /// Failure here never reaches the writer; the synchronized bound is a
    /// staleness optimization for cross-namespace listings, not a
    /// correctness requirement for the write itself.
    pub(super) fn spawn_shard_sync(&self, key: &ResourceKey, minimum: i64) {
        let pool = self.pool.clone();
        let group = key.group.clone();
        let resource = key.resource.clone();
        tokio::spawn(async move {
            let result = pool
                .get()
                .map_err(crate::error::StoreError::from)
                .and_then(|mut conn| version::synchronize_shards(&mut conn, &group, &resource, minimum));
            if let Err(error) = result {
                tracing::warn!(%group, %resource, minimum, %error, "shard synchronization failed");
            }
        });
    }
}

fn insert_history(conn: &Connection, guid: &str, event: &WriteEvent) -> StoreResult<()> {
    let key = &event.key;
    conn.execute(
        "INSERT INTO resource_history
             (guid, group_name, resource, namespace, name, value, action, previous_resource_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            guid,
            key.group,
            key.resource,
            key.namespace,
            key.name,
            event.value,
            event.action.as_str(),
            event.previous_version,
        ],
    )
    .map_err(BackendError::sql("insert into resource history"))?;
    Ok(())
}

fn stamp_history_version(conn: &Connection, guid: &str, rv: i64) -> StoreResult<()> {
    conn.execute(
        "UPDATE resource_history SET resource_version = ?1 WHERE guid = ?2",
        params![rv, guid],
    )
    .map_err(BackendError::sql("update resource history rv"))?;
    Ok(())
}

fn stamp_resource_version(conn: &Connection, guid: &str, rv: i64) -> StoreResult<()> {
    conn.execute(
        "UPDATE resource SET resource_version = ?1 WHERE guid = ?2",
        params![rv, guid],
    )
    .map_err(BackendError::sql("update resource rv"))?;
    Ok(())
}
