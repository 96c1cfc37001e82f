//! Error types for the resource store.
//!
//! This module defines all error types used throughout the store, following
//! a hierarchy that separates request validation errors from backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all store operations.
///
/// Absent resources are not represented here: reads of a missing key return
/// `Ok(None)` rather than an error.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Request validation errors.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Backend and database errors.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors caused by a malformed or unsupported request.
#[derive(Error, Debug)]
pub enum RequestError {
    /// A required key field was empty.
    #[error("missing required key field: {field}")]
    MissingKeyField { field: &'static str },

    /// An event action tag outside the supported set was supplied.
    #[error("unsupported event action: {action}")]
    UnsupportedAction { action: String },

    /// The continue token could not be decoded.
    #[error("invalid continue token: {token}")]
    InvalidContinueToken { token: String },

    /// A continue token and an explicit resource version disagree.
    #[error("requested resource version {requested} does not match continue token version {token}")]
    TokenVersionMismatch { requested: i64, token: i64 },

    /// No usable snapshot version could be resolved for an at-revision listing.
    #[error("expecting an explicit resource version")]
    ExplicitVersionRequired,

    /// A continue token was supplied to a latest-mode listing.
    #[error("latest listing serves only the first page")]
    UnexpectedContinueToken,

    /// An explicit resource version was supplied to a latest-mode listing.
    #[error("latest listing serves only the current resource version")]
    UnexpectedResourceVersion,

    /// A latest-mode listing was attempted across namespaces.
    #[error("latest listing requires a namespace")]
    NamespaceRequired,
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connecting to the database failed.
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The connection pool has no available connections.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// A SQL statement failed; `stage` names the failing step of the operation.
    #[cfg(feature = "sqlite")]
    #[error("{stage}: {source}")]
    Sql {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Encoding or decoding a stored payload failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Stored data violated an invariant the store relies on.
    #[error("invariant violation: {message}")]
    Invariant { message: String },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(feature = "sqlite")]
impl BackendError {
    /// Returns a `map_err` adapter that tags a SQL failure with the stage
    /// of the operation it occurred in.
    pub(crate) fn sql(stage: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Backend(BackendError::Sql { stage, source })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StoreError {
    fn from(_err: r2d2::Error) -> Self {
        StoreError::Backend(BackendError::PoolExhausted)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display() {
        let err = StoreError::Request(RequestError::MissingKeyField { field: "group" });
        assert_eq!(err.to_string(), "missing required key field: group");

        let err = RequestError::TokenVersionMismatch {
            requested: 7,
            token: 5,
        };
        assert_eq!(
            err.to_string(),
            "requested resource version 7 does not match continue token version 5"
        );
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Invariant {
            message: "history row missing name".to_string(),
        };
        assert!(err.to_string().contains("invariant violation"));

        let err = BackendError::PoolExhausted;
        assert_eq!(err.to_string(), "connection pool exhausted");
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sql_error_names_stage() {
        let err = BackendError::sql("insert into resource")(
            rusqlite::Error::ExecuteReturnedResults,
        );
        assert!(err.to_string().starts_with("insert into resource:"));
    }
}
