//! Write event types.
//!
//! A [`WriteEvent`] is the input to the write pipeline; a [`WrittenEvent`]
//! is the same event after a resource version has been assigned, and is the
//! unit delivered by the change feed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::types::ResourceKey;

/// The kind of mutation a write event carries.
///
/// This is a closed set; anything else arriving at a decode boundary is
/// rejected as a bad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventAction {
    /// The object was created.
    Added,
    /// The object was overwritten with a new value.
    Modified,
    /// The object was removed.
    Deleted,
}

impl EventAction {
    /// Returns the canonical string tag for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            EventAction::Added => "ADDED",
            EventAction::Modified => "MODIFIED",
            EventAction::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventAction {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => Ok(EventAction::Added),
            "MODIFIED" => Ok(EventAction::Modified),
            "DELETED" => Ok(EventAction::Deleted),
            other => Err(RequestError::UnsupportedAction {
                action: other.to_string(),
            }),
        }
    }
}

/// One mutation to apply through the write pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    /// The key being written.
    pub key: ResourceKey,

    /// The mutation kind.
    pub action: EventAction,

    /// The serialized object payload. Empty for deletes.
    pub value: Vec<u8>,

    /// The resource version this write supersedes, or 0 for the first write.
    pub previous_version: i64,
}

impl WriteEvent {
    /// Creates an ADDED event for a new object.
    pub fn added(key: ResourceKey, value: Vec<u8>) -> Self {
        Self {
            key,
            action: EventAction::Added,
            value,
            previous_version: 0,
        }
    }

    /// Creates a MODIFIED event superseding `previous_version`.
    pub fn modified(key: ResourceKey, value: Vec<u8>, previous_version: i64) -> Self {
        Self {
            key,
            action: EventAction::Modified,
            value,
            previous_version,
        }
    }

    /// Creates a DELETED event superseding `previous_version`.
    pub fn deleted(key: ResourceKey, previous_version: i64) -> Self {
        Self {
            key,
            action: EventAction::Deleted,
            value: Vec::new(),
            previous_version,
        }
    }
}

/// A write event after commit, stamped with its assigned resource version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenEvent {
    /// The committed write.
    pub event: WriteEvent,

    /// The resource version assigned to the write.
    pub resource_version: i64,
}
