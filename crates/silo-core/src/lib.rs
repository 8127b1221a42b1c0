//! # silo-core
//!
//! Core abstractions for the silo ingestion and query engine.
//!
//! This crate provides the foundational types and traits used across all
//! silo components:
//!
//! - **Identifiers**: Strongly-typed IDs for uploads, rows, and jobs
//! - **Upload Model**: Lifecycle state machine with validated transitions
//! - **Row Model**: Schema-less row payloads plus the filter/order/slice
//!   vocabulary shared with storage backends
//! - **Collaborator Traits**: Abstract row store and TTL cache interfaces,
//!   with in-memory implementations for testing
//! - **Cache Gateway**: The failure-absorbing front all cache access goes
//!   through
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `silo-core` is the **only** crate allowed to define shared primitives.
//! The ingestion and query crates interact with storage exclusively through
//! the traits defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod error;
pub mod id;
pub mod observability;
pub mod row;
pub mod store;
pub mod upload;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use silo_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{CacheGateway, CacheStore, MemoryCache};
    pub use crate::error::{Error, Result};
    pub use crate::id::{JobId, RowId, UploadId};
    pub use crate::row::{ColumnFilter, RowDraft, RowFilter, RowOrder, RowSlice, StoredRow};
    pub use crate::store::{MemoryRowStore, RowStore};
    pub use crate::upload::{Owner, Upload, UploadStatus};
}

// Re-export key types at crate root for ergonomics
pub use cache::{CacheGateway, CacheStore, MemoryCache};
pub use error::{Error, Result};
pub use id::{JobId, RowId, UploadId};
pub use observability::{LogFormat, init_logging};
pub use row::{ColumnFilter, RowDraft, RowFilter, RowOrder, RowSlice, StoredRow};
pub use store::{MemoryRowStore, RowStore};
pub use upload::{Owner, Upload, UploadStatus};
