//! Resource key type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Identifies one logical object in the store.
///
/// A key is the coordinate `(group, resource, namespace, name)`. The
/// namespace may be empty for cluster-scoped objects; the other three
/// fields are always required.
///
/// # Examples
///
/// ```
/// use strata_store::types::ResourceKey;
///
/// let key = ResourceKey::new("dashboards.example.com", "dashboards", "tenant-a", "overview");
/// assert!(!key.is_cluster_scoped());
/// assert!(key.validate().is_ok());
///
/// let global = ResourceKey::cluster_scoped("settings.example.com", "settings", "defaults");
/// assert!(global.is_cluster_scoped());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// The API group the object belongs to.
    pub group: String,

    /// The resource kind within the group.
    pub resource: String,

    /// The namespace, or empty for cluster-scoped objects.
    pub namespace: String,

    /// The object's name within its namespace.
    pub name: String,
}

impl ResourceKey {
    /// Creates a key for a namespaced object.
    pub fn new(
        group: impl Into<String>,
        resource: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a key for a cluster-scoped object (empty namespace).
    pub fn cluster_scoped(
        group: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(group, resource, "", name)
    }

    /// Returns `true` if the key has no namespace.
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Checks that all required fields are present.
    ///
    /// The namespace is optional; group, resource, and name must be non-empty.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.group.is_empty() {
            return Err(RequestError::MissingKeyField { field: "group" });
        }
        if self.resource.is_empty() {
            return Err(RequestError::MissingKeyField { field: "resource" });
        }
        if self.name.is_empty() {
            return Err(RequestError::MissingKeyField { field: "name" });
        }
        Ok(())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.group, self.resource, self.namespace, self.name
        )
    }
}
