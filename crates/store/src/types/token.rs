//! Continuation token for paginated listings.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// An opaque cursor for resuming a historical listing.
///
/// The token encodes the snapshot resource version the listing was taken at
/// and the row offset to resume from. Callers treat the encoded form as
/// opaque; it round-trips losslessly through [`encode`](Self::encode) and
/// [`decode`](Self::decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueToken {
    /// The snapshot resource version the listing is pinned to.
    pub resource_version: i64,

    /// The row offset the next page starts at.
    pub start_offset: i64,
}

impl ContinueToken {
    /// Encodes the token to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a token from its opaque string form.
    pub fn decode(s: &str) -> Result<Self, RequestError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| RequestError::InvalidContinueToken {
                token: s.to_string(),
            })?;

        serde_json::from_slice(&bytes).map_err(|_| RequestError::InvalidContinueToken {
            token: s.to_string(),
        })
    }
}
