//! Strata resource store.
//!
//! This crate provides a transactional resource store that layers optimistic,
//! monotonically increasing version numbers and a durable change history on
//! top of a relational database, and exposes a logical change feed over that
//! history via polling.
//!
//! Every stored object belongs to a `(group, resource, namespace, name)`
//! coordinate, and every mutation is assigned a strictly increasing resource
//! version scoped to its (group, resource) pair. Versions serve both
//! optimistic concurrency and incremental synchronization (watch).
//!
//! # Architecture
//!
//! - [`types`] - keys, write events, requests, continuation tokens
//! - [`error`] - error types for all operations
//! - [`core`] - the [`StorageBackend`] trait family a database dialect
//!   implements
//! - [`backends`] - backend implementations (SQLite behind the default
//!   `sqlite` feature)
//!
//! Inside a backend, four components cooperate:
//!
//! - **Version ledger** - per-(group, resource) counters partitioned across
//!   a fixed number of shards keyed by namespace hash, handing out strictly
//!   increasing versions.
//! - **Write pipeline** - applies each create/update/delete as one
//!   transaction that mutates the current-state table, appends an immutable
//!   history row, and stamps both with a fresh version.
//! - **Read/list engine** - current-state reads and listings, plus
//!   point-in-time historical listings with opaque continuation tokens.
//! - **Change-feed poller** - a background loop that turns new history rows
//!   into an ordered stream of [`WrittenEvent`](types::WrittenEvent)s.
//!
//! # Quick Start
//!
//! ```no_run
//! use strata_store::backends::sqlite::SqliteBackend;
//! use strata_store::core::{Lifecycle, StorageBackend};
//! use strata_store::types::{ReadRequest, ResourceKey, WriteEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! // Subscribe before writing: the feed delivers events committed after
//! // the subscription.
//! let mut feed = backend.watch().await?;
//!
//! let key = ResourceKey::new("playlists.example.com", "playlists", "tenant-a", "morning");
//! let rv = backend
//!     .write_event(WriteEvent::added(key.clone(), b"{\"title\":\"Morning\"}".to_vec()))
//!     .await?;
//!
//! // Reads of an absent key return None; this one is present.
//! let current = backend.read(ReadRequest::latest(key)).await?.unwrap();
//! assert_eq!(current.resource_version, rv);
//!
//! let event = feed.recv().await.unwrap();
//! assert_eq!(event.resource_version, rv);
//!
//! backend.stop();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{BackendError, RequestError, StoreError, StoreResult};
pub use types::{
    ContinueToken, EventAction, HealthStatus, ListItem, ListPage, ListRequest, ReadRequest,
    ResourceKey, StoredRevision, WriteEvent, WrittenEvent,
};

// Re-export core traits
pub use crate::core::{Diagnostics, Lifecycle, ListIterator, StorageBackend};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
