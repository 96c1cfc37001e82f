//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::instrument;
use uuid::Uuid;

use crate::core::{Diagnostics, Lifecycle, ListCallback, StorageBackend};
use crate::error::{BackendError, StoreError, StoreResult};
use crate::types::{
    EventAction, HealthStatus, ListRequest, ReadRequest, StoredRevision, WriteEvent, WrittenEvent,
};

use super::poller;
use super::schema;
use super::version::{EpochSource, WallClockEpoch};

/// SQLite storage backend.
///
/// Holds a connection pool, the version-ledger configuration, and the
/// shutdown signal shared by all change-feed pollers spawned from this
/// instance.
pub struct SqliteBackend {
    pub(super) pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    pub(super) epoch: Arc<dyn EpochSource>,
    is_memory: bool,
    shutdown: watch::Sender<bool>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Enable WAL mode for better concurrency (file databases only).
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Number of version-counter shards per (group, resource) pair.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Change-feed polling interval in milliseconds.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Artificial delay between the version-counter read and its update,
    /// in milliseconds. Widens the contention window so tests can exercise
    /// concurrent writers; keep at 0 outside of tests.
    #[serde(default)]
    pub contention_delay_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_shard_count() -> u32 {
    100
}

fn default_polling_interval_ms() -> u64 {
    100
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            shard_count: default_shard_count(),
            polling_interval_ms: default_polling_interval_ms(),
            contention_delay_ms: 0,
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory backend.
    pub fn in_memory() -> StoreResult<Self> {
        Self::in_memory_with_config(SqliteBackendConfig::default())
    }

    /// Creates an in-memory backend with custom configuration.
    pub fn in_memory_with_config(config: SqliteBackendConfig) -> StoreResult<Self> {
        // A plain :memory: database is private to each pooled connection;
        // a shared-cache URI gives the whole pool one store.
        let uri = format!(
            "file:strata-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        Self::build(&uri, config, true)
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Opens a backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteBackendConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        if path == ":memory:" {
            return Self::in_memory_with_config(config);
        }
        Self::build(&path, config, false)
    }

    fn build(source: &str, config: SqliteBackendConfig, is_memory: bool) -> StoreResult<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let enable_wal = config.enable_wal && !is_memory;
        let manager = SqliteConnectionManager::file(source).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| {
                StoreError::Backend(BackendError::ConnectionFailed {
                    message: e.to_string(),
                })
            })?;

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            pool,
            config,
            epoch: Arc::new(WallClockEpoch),
            is_memory,
            shutdown,
        })
    }

    /// Replaces the epoch source used to seed new resource versions.
    ///
    /// Tests inject a [`FixedEpoch`](super::FixedEpoch) to get small,
    /// deterministic version sequences.
    pub fn with_epoch_source(mut self, epoch: Arc<dyn EpochSource>) -> Self {
        self.epoch = epoch;
        self
    }

    /// Initialize the database schema. Idempotent.
    pub fn init_schema(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(super) fn connection(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StoreError::Backend(BackendError::ConnectionFailed {
                message: e.to_string(),
            })
        })
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    pub(super) fn contention_delay(&self) -> Duration {
        Duration::from_millis(self.config.contention_delay_ms)
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.config.polling_interval_ms)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, event), fields(key = %event.key, action = %event.action))]
    async fn write_event(&self, event: WriteEvent) -> StoreResult<i64> {
        event.key.validate()?;

        let rv = match event.action {
            EventAction::Added => self.create(&event)?,
            EventAction::Modified => self.update(&event)?,
            EventAction::Deleted => self.delete(&event)?,
        };

        self.spawn_shard_sync(&event.key, rv);
        Ok(rv)
    }

    #[instrument(skip(self, req), fields(key = %req.key, resource_version = req.resource_version))]
    async fn read(&self, req: ReadRequest) -> StoreResult<Option<StoredRevision>> {
        self.read_revision(&req)
    }

    #[instrument(skip(self, req, f), fields(group = %req.group, resource = %req.resource))]
    async fn list(&self, req: ListRequest, f: ListCallback<'_>) -> StoreResult<i64> {
        self.list_sync(&req, f)
    }

    async fn watch(&self) -> StoreResult<mpsc::Receiver<WrittenEvent>> {
        poller::subscribe(
            self.pool.clone(),
            self.polling_interval(),
            self.shutdown.subscribe(),
        )
    }
}

#[async_trait]
impl Diagnostics for SqliteBackend {
    async fn is_healthy(&self) -> StoreResult<HealthStatus> {
        let Ok(conn) = self.connection() else {
            return Ok(HealthStatus::NotServing);
        };
        match conn.query_row("SELECT 1", [], |_| Ok(())) {
            Ok(()) => Ok(HealthStatus::Serving),
            Err(_) => Ok(HealthStatus::NotServing),
        }
    }
}

impl Lifecycle for SqliteBackend {
    fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_backend() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.is_memory());
        assert_eq!(backend.backend_name(), "sqlite");
    }

    #[test]
    fn test_memory_path_routes_to_shared_cache() {
        let backend = SqliteBackend::open(":memory:").unwrap();
        assert!(backend.is_memory());
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        backend.init_schema().unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config: SqliteBackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.shard_count, 100);
        assert_eq!(config.polling_interval_ms, 100);
        assert_eq!(config.contention_delay_ms, 0);
        assert!(config.enable_wal);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        assert_eq!(backend.is_healthy().await.unwrap(), HealthStatus::Serving);
    }
}
