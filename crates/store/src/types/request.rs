//! Read and list request/response types.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::types::{EventAction, ResourceKey};

/// A request to read one object, either current or at a specific version.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// The key to read.
    pub key: ResourceKey,

    /// The exact resource version to read, or 0 for the current state.
    pub resource_version: i64,
}

impl ReadRequest {
    /// Reads the current state of `key`.
    pub fn latest(key: ResourceKey) -> Self {
        Self {
            key,
            resource_version: 0,
        }
    }

    /// Reads `key` as it was at exactly `resource_version`.
    pub fn at_version(key: ResourceKey, resource_version: i64) -> Self {
        Self {
            key,
            resource_version,
        }
    }
}

/// One stored object revision returned by a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRevision {
    /// The object's key.
    pub key: ResourceKey,

    /// The resource version of this revision.
    pub resource_version: i64,

    /// The serialized object payload.
    pub value: Vec<u8>,
}

/// A request to list objects of one (group, resource) pair.
///
/// An empty namespace selects all namespaces (cross-shard). A request with
/// no explicit version and no continue token against a single namespace is
/// served from the current state; everything else is served from history at
/// a snapshot version.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// The API group to list.
    pub group: String,

    /// The resource kind to list.
    pub resource: String,

    /// The namespace to list, or empty for all namespaces.
    pub namespace: String,

    /// Optional name prefix filter.
    pub name_prefix: Option<String>,

    /// The snapshot version to list at, or 0 to resolve one.
    pub resource_version: i64,

    /// Continue token from a previous page, if resuming.
    pub continue_token: Option<String>,
}

impl ListRequest {
    /// Lists one namespace of a (group, resource) pair.
    pub fn namespaced(
        group: impl Into<String>,
        resource: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Lists a (group, resource) pair across all namespaces.
    pub fn cross_namespace(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
            ..Self::default()
        }
    }

    /// Pins the listing to an explicit snapshot version.
    pub fn at_version(mut self, resource_version: i64) -> Self {
        self.resource_version = resource_version;
        self
    }

    /// Resumes the listing from a continue token.
    pub fn with_continue_token(mut self, token: impl Into<String>) -> Self {
        self.continue_token = Some(token.into());
        self
    }

    /// Restricts the listing to names starting with `prefix`.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Checks that the group and resource are present.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.group.is_empty() {
            return Err(RequestError::MissingKeyField { field: "group" });
        }
        if self.resource.is_empty() {
            return Err(RequestError::MissingKeyField { field: "resource" });
        }
        Ok(())
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// The object's namespace.
    pub namespace: String,

    /// The object's name.
    pub name: String,

    /// The resource version of the listed revision.
    pub resource_version: i64,

    /// The serialized object payload.
    pub value: Vec<u8>,

    /// The mutation that produced this revision. `None` in latest-mode
    /// listings, where only live objects appear; in at-revision listings a
    /// `Deleted` action marks a tombstone.
    pub action: Option<EventAction>,
}

/// A fully materialized page of list results.
#[derive(Debug, Clone)]
pub struct ListPage {
    /// The listed items.
    pub items: Vec<ListItem>,

    /// The resource version the listing is valid as of.
    pub resource_version: i64,

    /// Token to resume the listing after the last item, if any rows exist.
    pub continue_token: Option<String>,
}

/// Result of a liveness probe against the backing database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// The database answered the probe.
    Serving,
    /// The database did not answer the probe.
    NotServing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_request_validate() {
        assert!(ListRequest::namespaced("grp", "res", "ns").validate().is_ok());
        assert!(ListRequest::cross_namespace("grp", "res").validate().is_ok());

        let missing = ListRequest::namespaced("", "res", "ns");
        assert!(matches!(
            missing.validate(),
            Err(RequestError::MissingKeyField { field: "group" })
        ));
    }

    #[test]
    fn test_read_request_constructors() {
        let key = ResourceKey::new("grp", "res", "ns", "a");
        assert_eq!(ReadRequest::latest(key.clone()).resource_version, 0);
        assert_eq!(ReadRequest::at_version(key, 9).resource_version, 9);
    }

    #[test]
    fn test_list_request_builders() {
        let req = ListRequest::cross_namespace("grp", "res")
            .at_version(12)
            .with_name_prefix("dash-");
        assert_eq!(req.resource_version, 12);
        assert_eq!(req.name_prefix.as_deref(), Some("dash-"));
        assert!(req.namespace.is_empty());
    }
}
