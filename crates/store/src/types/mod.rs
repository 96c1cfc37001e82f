//! Core types for keys, events, requests, and pagination.

mod event;
mod key;
mod request;
mod token;

pub use event::{EventAction, WriteEvent, WrittenEvent};
pub use key::ResourceKey;
pub use request::{HealthStatus, ListItem, ListPage, ListRequest, ReadRequest, StoredRevision};
pub use token::ContinueToken;
