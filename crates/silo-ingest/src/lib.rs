//! # silo-ingest
//!
//! Chunked asynchronous ingestion of delimited-text files into the silo
//! row store.
//!
//! This crate implements the write side of silo:
//!
//! - **Header Normalization**: Raw column headers to unique, stable field
//!   identifiers
//! - **Chunked Streaming**: Bounded windows over arbitrarily large files,
//!   never materializing the whole dataset
//! - **Lifecycle Tracking**: The upload state machine driven to a terminal
//!   outcome, with progress observable from outside the run
//! - **Bounded Retry**: Failed runs resubmitted up to a fixed ceiling with
//!   fixed backoff, mirroring the external job runtime's contract
//! - **Lifecycle Notification**: Best-effort terminal-outcome reports to a
//!   delivery collaborator
//!
//! ## Guarantees
//!
//! - **Bounded memory**: At most one window of rows is alive at a time, and
//!   bulk writes happen in fixed-size sub-batches
//! - **Monotonic progress**: `processed_rows` never decreases within a run,
//!   and a window's write is durable before the next window is read
//! - **Restart safety**: A failed run re-enters `processing` through the
//!   validated state machine; progress counters restart with the run

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod progress;
pub mod reader;
pub mod runner;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::engine::{IngestConfig, IngestOutcome, IngestionEngine, ProgressSnapshot};
    pub use crate::error::{Error, Result};
    pub use crate::normalize::{normalize_header, normalize_headers};
    pub use crate::notify::{MemoryNotificationSink, NotificationSink, UploadReport};
    pub use crate::progress::{MemoryProgressSink, NullProgressSink, ProgressSink, ProgressUpdate};
    pub use crate::runner::{IngestRunner, RetryPolicy};
}

pub use engine::{IngestConfig, IngestOutcome, IngestionEngine, ProgressSnapshot};
pub use error::{Error, Result};
pub use normalize::{normalize_header, normalize_headers};
pub use notify::{MemoryNotificationSink, NotificationSink, UploadReport};
pub use progress::{MemoryProgressSink, NullProgressSink, ProgressSink, ProgressUpdate};
pub use runner::{IngestRunner, RetryPolicy};
