//! SQLite backend implementation.
//!
//! A complete implementation of the storage traits on SQLite, supporting
//! both in-memory databases (great for testing) and file-based databases.
//! Write serialization relies on SQLite's IMMEDIATE transactions: the write
//! lock is held for the whole read-modify-write of the version counters, so
//! version assignment is correct even with several processes on one file.
//!
//! # Example
//!
//! ```no_run
//! use strata_store::backends::sqlite::SqliteBackend;
//! use strata_store::core::StorageBackend;
//! use strata_store::types::{ResourceKey, WriteEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let key = ResourceKey::new("playlists.example.com", "playlists", "tenant-a", "morning");
//! let rv = backend
//!     .write_event(WriteEvent::added(key, b"{\"title\":\"Morning\"}".to_vec()))
//!     .await?;
//! println!("created at resource version {rv}");
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Current state, one row per live object
//! CREATE TABLE resource (
//!     guid TEXT NOT NULL,
//!     group_name TEXT NOT NULL,
//!     resource TEXT NOT NULL,
//!     namespace TEXT NOT NULL DEFAULT '',
//!     name TEXT NOT NULL,
//!     value BLOB NOT NULL,
//!     resource_version INTEGER NOT NULL DEFAULT 0,
//!     PRIMARY KEY (group_name, resource, namespace, name)
//! );
//!
//! -- Append-only history, one row per mutation
//! CREATE TABLE resource_history (
//!     guid TEXT NOT NULL PRIMARY KEY,
//!     group_name TEXT NOT NULL,
//!     resource TEXT NOT NULL,
//!     namespace TEXT NOT NULL DEFAULT '',
//!     name TEXT NOT NULL,
//!     value BLOB NOT NULL,
//!     action TEXT NOT NULL,
//!     resource_version INTEGER NOT NULL DEFAULT 0,
//!     previous_resource_version INTEGER NOT NULL DEFAULT 0
//! );
//!
//! -- Version counters, one row per (group, resource, shard)
//! CREATE TABLE resource_version (
//!     group_name TEXT NOT NULL,
//!     resource TEXT NOT NULL,
//!     shard INTEGER NOT NULL,
//!     resource_version INTEGER NOT NULL DEFAULT 0,
//!     PRIMARY KEY (group_name, resource, shard)
//! );
//! ```

mod backend;
mod list;
mod poller;
mod schema;
mod version;
mod write;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use version::{EpochSource, FixedEpoch, WallClockEpoch};
