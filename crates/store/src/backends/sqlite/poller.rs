//! Change-feed poller.
//!
//! Converts the history table into a live ordered stream of
//! [`WrittenEvent`]s without any push mechanism: a background task
//! remembers the last version delivered per (group, resource) pair and
//! periodically queries history for newer rows.

use std::collections::HashMap;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, params};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::error::{BackendError, StoreResult};
use crate::types::{EventAction, ResourceKey, WriteEvent, WrittenEvent};

use super::version;

type PairMarks = HashMap<(String, String), i64>;

/// Starts a poller and returns its event stream.
///
/// The high-water marks are initialized to the versions visible right now,
/// so the feed only delivers events committed after subscription. Pairs
/// that appear in the ledger later are picked up automatically and
/// delivered from their beginning.
pub(super) fn subscribe(
    pool: Pool<SqliteConnectionManager>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> StoreResult<mpsc::Receiver<WrittenEvent>> {
    let mut since = PairMarks::new();
    {
        let conn = pool.get()?;
        for (group, resource, rv) in version::latest_versions(&conn)? {
            since.insert((group, resource), rv);
        }
    }

    // Capacity 1: the poller stalls on send until the consumer receives,
    // which throttles polling of every pair behind a slow consumer.
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(run(pool, interval, shutdown, since, tx));
    Ok(rx)
}

async fn run(
    pool: Pool<SqliteConnectionManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut since: PairMarks,
    tx: mpsc::Sender<WrittenEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                match changed {
                    Ok(()) if !*shutdown.borrow_and_update() => continue,
                    // Stop was requested, or the backend went away.
                    _ => return,
                }
            }
            _ = ticker.tick() => {}
        }

        let pairs = {
            let conn = match pool.get() {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::error!(%error, "change feed connection failed");
                    continue;
                }
            };
            match version::latest_versions(&conn) {
                Ok(pairs) => pairs,
                Err(error) => {
                    tracing::error!(%error, "list latest resource versions failed");
                    continue;
                }
            }
        };

        for (group, resource, _) in pairs {
            let mark = *since.get(&(group.clone(), resource.clone())).unwrap_or(&0);

            // A failed pair is retried on the next tick; it never stops the
            // feed or polling of the other pairs.
            let events = {
                let conn = match pool.get() {
                    Ok(conn) => conn,
                    Err(error) => {
                        tracing::error!(%group, %resource, %error, "change feed connection failed");
                        continue;
                    }
                };
                match poll_pair(&conn, &group, &resource, mark) {
                    Ok(events) => events,
                    Err(error) => {
                        tracing::error!(%group, %resource, %error, "history poll failed");
                        continue;
                    }
                }
            };

            let mut next = mark;
            for event in events {
                let rv = event.resource_version;
                if tx.send(event).await.is_err() {
                    // Consumer is gone; nothing left to feed.
                    return;
                }
                if rv > next {
                    next = rv;
                }
            }
            since.insert((group, resource), next);
        }
    }
}

/// Returns the history rows of one pair strictly newer than `since`, in
/// version order.
fn poll_pair(
    conn: &Connection,
    group: &str,
    resource: &str,
    since: i64,
) -> StoreResult<Vec<WrittenEvent>> {
    let mut stmt = conn
        .prepare(
            "SELECT namespace, name, value, action, resource_version, previous_resource_version
             FROM resource_history
             WHERE group_name = ?1 AND resource = ?2 AND resource_version > ?3
             ORDER BY resource_version ASC",
        )
        .map_err(BackendError::sql("prepare history poll"))?;

    let rows = stmt
        .query_map(params![group, resource, since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .map_err(BackendError::sql("poll history"))?;

    let mut events = Vec::new();
    for row in rows {
        let (namespace, name, value, action_tag, resource_version, previous_version) =
            row.map_err(BackendError::sql("scan history row"))?;

        // A malformed row is fatal to that item only.
        if name.is_empty() {
            tracing::error!(%group, %resource, resource_version, "history row missing name");
            continue;
        }
        let action = match action_tag.parse::<EventAction>() {
            Ok(action) => action,
            Err(_) => {
                tracing::error!(
                    %group,
                    %resource,
                    resource_version,
                    action = %action_tag,
                    "history row carries unknown action",
                );
                continue;
            }
        };

        events.push(WrittenEvent {
            event: WriteEvent {
                key: ResourceKey::new(group, resource, namespace, name),
                action,
                value,
                previous_version,
            },
            resource_version,
        });
    }
    Ok(events)
}
