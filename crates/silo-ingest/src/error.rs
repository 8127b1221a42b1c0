//! Error types for the ingestion domain.

use silo_core::UploadId;

/// The result type used throughout silo-ingest.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ingestion operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload to ingest does not exist.
    #[error("upload not found: {0}")]
    UploadNotFound(UploadId),

    /// The submitted source file was rejected before ingestion.
    #[error("invalid source file: {0}")]
    InvalidSource(String),

    /// The source file could not be read.
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),

    /// The source file could not be parsed as delimited text.
    #[error("failed to parse delimited text: {0}")]
    Parse(#[from] csv::Error),

    /// The retry ceiling was exhausted; the upload stays failed.
    #[error("ingestion failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The final attempt's error message.
        message: String,
    },

    /// An error from silo-core (storage, state machine).
    #[error("core error: {0}")]
    Core(#[from] silo_core::Error),
}
