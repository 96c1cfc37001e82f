//! Core storage backend trait.
//!
//! This module defines the [`StorageBackend`] trait, the seam a database
//! dialect implements: the transactional write pipeline, point reads,
//! listing, and the polled change feed.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreResult;
use crate::types::{
    EventAction, ListItem, ListPage, ListRequest, ReadRequest, StoredRevision, WriteEvent,
    WrittenEvent,
};

/// A forward-only cursor over the rows of one listing.
///
/// The cursor is single-pass and not restartable; a fresh list call is
/// required to start over. The row accessors return the row most recently
/// reached by a successful [`advance`](Self::advance). The backend closes
/// the underlying statement when the list call returns, on every exit path.
pub trait ListIterator {
    /// Moves to the next row. Returns `false` at the end of the listing or
    /// on a row error, in which case [`error`](Self::error) is set.
    fn advance(&mut self) -> bool;

    /// The resource version of the current row.
    fn resource_version(&self) -> i64;

    /// The namespace of the current row.
    fn namespace(&self) -> &str;

    /// The name of the current row.
    fn name(&self) -> &str;

    /// The serialized payload of the current row.
    fn value(&self) -> &[u8];

    /// The mutation that produced the current row. `None` in latest-mode
    /// listings; `Some(EventAction::Deleted)` marks a tombstone in
    /// at-revision listings.
    fn action(&self) -> Option<EventAction>;

    /// The terminal error, if iteration stopped on one.
    fn error(&self) -> Option<&crate::error::StoreError>;

    /// A token that resumes the listing after the current row.
    fn continue_token(&self) -> String;
}

/// Callback invoked with the live cursor of a listing.
pub type ListCallback<'a> =
    &'a mut (dyn FnMut(&mut dyn ListIterator) -> StoreResult<()> + Send);

/// A transactional, versioned resource store.
///
/// Every mutation is assigned a strictly increasing resource version scoped
/// to its (group, resource) pair, recorded in an append-only history, and
/// eventually delivered on the change feed returned by
/// [`watch`](Self::watch).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Applies one write event atomically and returns the assigned
    /// resource version.
    ///
    /// The current-state mutation, the history append, and the version
    /// assignment commit or roll back together. Errors name the failing
    /// stage.
    async fn write_event(&self, event: WriteEvent) -> StoreResult<i64>;

    /// Reads one object, either its current state (`resource_version == 0`)
    /// or an exact historical revision.
    ///
    /// An absent key (or absent revision) is a first-class `None`, not an
    /// error.
    async fn read(&self, req: ReadRequest) -> StoreResult<Option<StoredRevision>>;

    /// Lists objects matching `req`, handing the live cursor to `f`.
    ///
    /// Returns the resource version the listing is valid as of. The cursor
    /// is only valid for the duration of the callback.
    async fn list(&self, req: ListRequest, f: ListCallback<'_>) -> StoreResult<i64>;

    /// Subscribes to the change feed.
    ///
    /// The feed delivers every write committed after the subscription, in
    /// version order within each (group, resource) pair, with no ordering
    /// guarantee across pairs. The channel closes when the backend is
    /// stopped.
    async fn watch(&self) -> StoreResult<mpsc::Receiver<WrittenEvent>>;

    /// Lists objects matching `req` into a fully materialized page.
    async fn list_page(&self, req: ListRequest) -> StoreResult<ListPage> {
        let mut items = Vec::new();
        let mut token = None;
        let resource_version = self
            .list(req, &mut |iter| {
                while iter.advance() {
                    items.push(ListItem {
                        namespace: iter.namespace().to_owned(),
                        name: iter.name().to_owned(),
                        resource_version: iter.resource_version(),
                        value: iter.value().to_vec(),
                        action: iter.action(),
                    });
                }
                if !items.is_empty() {
                    token = Some(iter.continue_token());
                }
                Ok(())
            })
            .await?;

        Ok(ListPage {
            items,
            resource_version,
            continue_token: token,
        })
    }
}
