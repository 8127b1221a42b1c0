//! Error types for the query domain.
//!
//! The taxonomy mirrors the read-path contract: validation failures are
//! rejected before any storage work, not-ready uploads are rejected without
//! retry, and every storage failure surfaces as a generic query failure with
//! no partial results.

use silo_core::{UploadId, UploadStatus};

/// The result type used throughout silo-query.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in query operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed query parameters (bad filters JSON, bad cursor).
    #[error("invalid query: {0}")]
    Validation(String),

    /// The queried upload does not exist.
    #[error("upload not found: {0}")]
    UploadNotFound(UploadId),

    /// The upload has not finished ingesting.
    #[error("upload {upload_id} is not ready: status is {status}")]
    NotReady {
        /// The upload being queried.
        upload_id: UploadId,
        /// Its current lifecycle state.
        status: UploadStatus,
    },

    /// The row store failed; no partial results are returned.
    #[error("query failed: {0}")]
    Query(#[from] silo_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_names_the_current_status() {
        let err = Error::NotReady {
            upload_id: UploadId::generate(),
            status: UploadStatus::Processing,
        };
        assert!(err.to_string().contains("status is processing"));
    }

    #[test]
    fn validation_error_display() {
        let err = Error::Validation("filters must be a JSON object".into());
        assert!(err.to_string().starts_with("invalid query"));
    }
}
