//! Error types for registry access.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the registry query/execute API.
///
/// None of these are retried locally; they propagate to the caller.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),

    /// Transport-level failure (connection, timeout, TLS).
    #[error("registry request failed: {0}")]
    Http(String),

    /// The registry answered with a non-success status.
    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode registry response: {0}")]
    Decode(String),

    /// A record that must exist was not returned.
    #[error("no {sobject} record found for {id}")]
    MissingRecord { sobject: String, id: String },

    /// Object creation was rejected.
    #[error("failed to create {sobject}: {reason}")]
    Rejected { sobject: String, reason: String },
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = RegistryError::Status {
            status: 401,
            body: "INVALID_SESSION_ID".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "registry returned HTTP 401: INVALID_SESSION_ID"
        );
    }

    #[test]
    fn test_missing_record_display() {
        let err = RegistryError::MissingRecord {
            sobject: "Package2Version".to_string(),
            id: "05i000000000001".to_string(),
        };
        assert!(err.to_string().contains("Package2Version"));
        assert!(err.to_string().contains("05i000000000001"));
    }
}
