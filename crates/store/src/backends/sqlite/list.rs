//! Read and list engine.
//!
//! Current-state reads and single-namespace listings are served from the
//! `resource` table; everything else (cross-namespace, explicit version, or
//! resumed listings) is served from `resource_history` at a snapshot
//! version, with offset-based continuation.

use rusqlite::ToSql;

use crate::core::{ListCallback, ListIterator};
use crate::error::{BackendError, RequestError, StoreError, StoreResult};
use crate::types::{ContinueToken, EventAction, ListRequest, ReadRequest, StoredRevision};

use super::SqliteBackend;
use super::version;

impl SqliteBackend {
    /// Reads one object, current state or an exact historical revision.
    pub(super) fn read_revision(&self, req: &ReadRequest) -> StoreResult<Option<StoredRevision>> {
        req.key.validate()?;
        let conn = self.connection()?;
        let key = &req.key;

        let row = if req.resource_version > 0 {
            conn.query_row(
                "SELECT value, resource_version FROM resource_history
                 WHERE group_name = ?1 AND resource = ?2 AND namespace = ?3 AND name = ?4
                   AND resource_version = ?5",
                rusqlite::params![
                    key.group,
                    key.resource,
                    key.namespace,
                    key.name,
                    req.resource_version
                ],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
            )
        } else {
            conn.query_row(
                "SELECT value, resource_version FROM resource
                 WHERE group_name = ?1 AND resource = ?2 AND namespace = ?3 AND name = ?4",
                rusqlite::params![key.group, key.resource, key.namespace, key.name],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
            )
        };

        match row {
            Ok((value, resource_version)) => Ok(Some(StoredRevision {
                key: req.key.clone(),
                resource_version,
                value,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(BackendError::sql("read resource")(err)),
        }
    }

    /// Lists objects matching `req`, handing the live cursor to `f`.
    pub(super) fn list_sync(&self, req: &ListRequest, f: ListCallback<'_>) -> StoreResult<i64> {
        req.validate()?;

        if req.namespace.is_empty() || req.resource_version > 0 || req.continue_token.is_some() {
            self.list_at_revision(req, f)
        } else {
            self.list_latest(req, f)
        }
    }

    /// Serves a single-namespace listing from the current-state table,
    /// labeled with the namespace shard's latest known version.
    fn list_latest(&self, req: &ListRequest, f: ListCallback<'_>) -> StoreResult<i64> {
        if req.continue_token.is_some() {
            return Err(RequestError::UnexpectedContinueToken.into());
        }
        if req.resource_version > 0 {
            return Err(RequestError::UnexpectedResourceVersion.into());
        }
        if req.namespace.is_empty() {
            // Namespace queries are only valid within a single shard.
            return Err(RequestError::NamespaceRequired.into());
        }

        let conn = self.connection()?;
        let shard = version::shard_for(&req.namespace, self.config().shard_count);
        let list_rv = version::latest_shard_version(&conn, &req.group, &req.resource, shard)?;

        let mut query = String::from(
            "SELECT resource_version, namespace, name, value FROM resource
             WHERE group_name = ? AND resource = ? AND namespace = ?",
        );
        let like_pattern = req.name_prefix.as_deref().map(like_prefix);
        let mut params: Vec<&dyn ToSql> = vec![&req.group, &req.resource, &req.namespace];
        if let Some(pattern) = &like_pattern {
            query.push_str(" AND name LIKE ? ESCAPE '\\'");
            params.push(pattern);
        }
        query.push_str(" ORDER BY namespace, name");

        let mut stmt = conn
            .prepare(&query)
            .map_err(BackendError::sql("prepare resource list"))?;
        let rows = stmt
            .query(&params[..])
            .map_err(BackendError::sql("list resources"))?;

        let mut iter = SqliteListIter::new(rows, list_rv, 0, false);
        f(&mut iter)?;
        if let Some(err) = iter.take_error() {
            return Err(err);
        }
        Ok(list_rv)
    }

    /// Serves a listing from the history table at a snapshot version.
    fn list_at_revision(&self, req: &ListRequest, f: ListCallback<'_>) -> StoreResult<i64> {
        let conn = self.connection()?;

        let mut list_rv = req.resource_version;
        let mut offset = 0i64;
        if let Some(token_str) = &req.continue_token {
            let token = ContinueToken::decode(token_str)?;
            if req.resource_version > 0 && req.resource_version != token.resource_version {
                return Err(RequestError::TokenVersionMismatch {
                    requested: req.resource_version,
                    token: token.resource_version,
                }
                .into());
            }
            list_rv = token.resource_version;
            offset = token.start_offset;
        } else if list_rv == 0 && req.namespace.is_empty() {
            // Cross-namespace snapshots are bounded by the slowest shard;
            // very recent writes in faster shards may not be visible yet.
            list_rv = version::min_version(&conn, &req.group, &req.resource)?.unwrap_or(0);
        }
        if list_rv < 1 {
            return Err(RequestError::ExplicitVersionRequired.into());
        }

        let mut query = String::from(
            "SELECT h.resource_version, h.namespace, h.name, h.value, h.action
             FROM resource_history h
             JOIN (
                 SELECT namespace, name, MAX(resource_version) AS max_rv
                 FROM resource_history
                 WHERE group_name = ? AND resource = ? AND resource_version <= ?",
        );
        let like_pattern = req.name_prefix.as_deref().map(like_prefix);
        let mut params: Vec<&dyn ToSql> = vec![&req.group, &req.resource, &list_rv];
        if !req.namespace.is_empty() {
            query.push_str(" AND namespace = ?");
            params.push(&req.namespace);
        }
        if let Some(pattern) = &like_pattern {
            query.push_str(" AND name LIKE ? ESCAPE '\\'");
            params.push(pattern);
        }
        query.push_str(
            "    GROUP BY namespace, name
             ) latest
               ON latest.namespace = h.namespace
              AND latest.name = h.name
              AND latest.max_rv = h.resource_version
             WHERE h.group_name = ? AND h.resource = ?
             ORDER BY h.namespace, h.name
             LIMIT -1 OFFSET ?",
        );
        params.push(&req.group);
        params.push(&req.resource);
        params.push(&offset);

        let mut stmt = conn
            .prepare(&query)
            .map_err(BackendError::sql("prepare resource history list"))?;
        let rows = stmt
            .query(&params[..])
            .map_err(BackendError::sql("list resource history"))?;

        let mut iter = SqliteListIter::new(rows, list_rv, offset, true);
        f(&mut iter)?;
        if let Some(err) = iter.take_error() {
            return Err(err);
        }
        Ok(list_rv)
    }
}

/// Escapes LIKE metacharacters in `prefix` and appends the wildcard.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

struct CurrentRow {
    resource_version: i64,
    namespace: String,
    name: String,
    value: Vec<u8>,
    action: Option<EventAction>,
}

/// Cursor over the rows of one listing.
///
/// Holds the live statement for the duration of the list callback; the
/// statement is closed when the backend's list call returns, on every exit
/// path.
pub(super) struct SqliteListIter<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    list_rv: i64,
    offset: i64,
    with_action: bool,
    current: Option<CurrentRow>,
    err: Option<StoreError>,
}

impl<'stmt> SqliteListIter<'stmt> {
    fn new(rows: rusqlite::Rows<'stmt>, list_rv: i64, offset: i64, with_action: bool) -> Self {
        Self {
            rows,
            list_rv,
            offset,
            with_action,
            current: None,
            err: None,
        }
    }

    fn take_error(&mut self) -> Option<StoreError> {
        self.err.take()
    }
}

fn scan_row(row: &rusqlite::Row<'_>, with_action: bool) -> StoreResult<CurrentRow> {
    let resource_version = row.get(0).map_err(BackendError::sql("scan list row"))?;
    let namespace = row.get(1).map_err(BackendError::sql("scan list row"))?;
    let name = row.get(2).map_err(BackendError::sql("scan list row"))?;
    let value = row.get(3).map_err(BackendError::sql("scan list row"))?;
    let action = if with_action {
        let tag: String = row.get(4).map_err(BackendError::sql("scan list row"))?;
        let action = tag.parse::<EventAction>().map_err(|_| {
            StoreError::Backend(BackendError::Invariant {
                message: format!("unknown action tag {tag:?} in history"),
            })
        })?;
        Some(action)
    } else {
        None
    };

    Ok(CurrentRow {
        resource_version,
        namespace,
        name,
        value,
        action,
    })
}

impl ListIterator for SqliteListIter<'_> {
    fn advance(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        match self.rows.next() {
            Ok(Some(row)) => match scan_row(row, self.with_action) {
                Ok(current) => {
                    self.offset += 1;
                    self.current = Some(current);
                    true
                }
                Err(err) => {
                    self.err = Some(err);
                    false
                }
            },
            Ok(None) => false,
            Err(err) => {
                self.err = Some(BackendError::sql("advance list rows")(err));
                false
            }
        }
    }

    fn resource_version(&self) -> i64 {
        self.current.as_ref().map_or(0, |row| row.resource_version)
    }

    fn namespace(&self) -> &str {
        self.current.as_ref().map_or("", |row| &row.namespace)
    }

    fn name(&self) -> &str {
        self.current.as_ref().map_or("", |row| &row.name)
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |row| &row.value)
    }

    fn action(&self) -> Option<EventAction> {
        self.current.as_ref().and_then(|row| row.action)
    }

    fn error(&self) -> Option<&StoreError> {
        self.err.as_ref()
    }

    fn continue_token(&self) -> String {
        ContinueToken {
            resource_version: self.list_rv,
            start_offset: self.offset,
        }
        .encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_escapes_metacharacters() {
        assert_eq!(like_prefix("dash-"), "dash-%");
        assert_eq!(like_prefix("100%_a\\b"), "100\\%\\_a\\\\b%");
    }
}
