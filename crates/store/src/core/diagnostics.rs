//! Diagnostics and lifecycle traits.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::HealthStatus;

/// Liveness probe against the backing database.
#[async_trait]
pub trait Diagnostics: Send + Sync {
    /// Performs a trivial connectivity check and reports serving status.
    async fn is_healthy(&self) -> StoreResult<HealthStatus>;
}

/// Lifecycle control for a backend instance.
pub trait Lifecycle {
    /// Stops background work. Change-feed pollers exit and their channels
    /// close; in-flight request calls are unaffected.
    fn stop(&self);
}
