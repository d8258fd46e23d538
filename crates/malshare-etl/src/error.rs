//! Error types for the MalShare ETL connector
//!
//! Three layers, matching the three places a run can fail:
//!
//! - [`FetchError`]: one call to the MalShare API, after retries
//! - [`StoreError`]: one operation against the document collection
//! - [`PipelineError`]: the errors that abort a whole run
//!
//! Per-record failures never surface as a `PipelineError`; they are counted
//! in the run summary instead.

use crate::client::Endpoint;
use crate::loader::LoadReport;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a single attempt failed in a way worth retrying
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("rate limited by the service")]
    RateLimited { retry_after: Option<Duration> },
}

/// Outcome of a single failed request attempt
#[derive(Debug)]
pub enum AttemptFailure {
    /// May succeed if tried again
    Transient(TransientCause),
    /// Retrying cannot help
    Fatal(FetchError),
}

/// A failed call to the MalShare API
#[derive(Error, Debug)]
pub enum FetchError {
    /// 401/403 from the service. Never retried.
    #[error("Authentication rejected by '{endpoint}' (HTTP {status}). Check MALSHARE_API_KEY.")]
    Authentication { endpoint: Endpoint, status: u16 },

    /// Every allowed attempt failed transiently
    #[error("'{endpoint}' failed after {attempts} attempt(s): {cause}")]
    TransientFetch {
        endpoint: Endpoint,
        attempts: u32,
        cause: TransientCause,
    },

    /// Any other non-success status
    #[error("'{endpoint}' rejected the request (HTTP {status})")]
    Rejected { endpoint: Endpoint, status: u16 },

    /// The body could not be decoded
    #[error("Failed to decode '{endpoint}' response: {message}")]
    Decode { endpoint: Endpoint, message: String },

    /// The HTTP client itself could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether retries were attempted and exhausted
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TransientFetch { .. })
    }
}

/// A failed document collection operation
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached; nothing further will succeed
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// The store refused this particular operation
    #[error("Document store rejected the operation: {0}")]
    Rejected(String),

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failure means the connection is gone
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

impl From<malshare_common::CommonError> for StoreError {
    fn from(err: malshare_common::CommonError) -> Self {
        match err {
            malshare_common::CommonError::Serialization(e) => StoreError::Serialization(e),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad or missing configuration; raised before any I/O
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The listing call could not be completed
    #[error("MalShare API unavailable: {0}")]
    SourceUnavailable(#[source] FetchError),

    /// The store went away; `committed` holds what was persisted before that
    #[error(
        "Document store unavailable after {} document(s) were committed: {source}",
        .committed.persisted()
    )]
    StoreUnavailable {
        committed: LoadReport,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_pool_errors_are_unavailable() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_unavailable());
    }

    #[test]
    fn test_authentication_message_names_variable_not_value() {
        let err = FetchError::Authentication {
            endpoint: Endpoint::List,
            status: 401,
        };
        let message = err.to_string();
        assert!(message.contains("MALSHARE_API_KEY"));
        assert!(message.contains("401"));
    }

    #[test]
    fn test_store_unavailable_reports_committed_count() {
        let err = PipelineError::StoreUnavailable {
            committed: LoadReport {
                inserted: 3,
                updated: 1,
                skipped: 1,
                failed: 0,
            },
            source: StoreError::Unavailable("connection reset".to_string()),
        };
        assert!(err.to_string().contains("5 document(s)"));
    }

    #[test]
    fn test_only_exhausted_retries_are_transient() {
        let exhausted = FetchError::TransientFetch {
            endpoint: Endpoint::Details,
            attempts: 3,
            cause: TransientCause::ServerError { status: 503 },
        };
        let rejected = FetchError::Rejected {
            endpoint: Endpoint::Details,
            status: 404,
        };
        assert!(exhausted.is_transient());
        assert!(!rejected.is_transient());
    }
}
