//! # silo-query
//!
//! Paginated, cached query engine over ingested silo rows.
//!
//! This crate implements the read side of silo:
//!
//! - **Request Validation**: Parameter clamping and filters-JSON parsing
//! - **Filtering**: Free-text search OR-matched across all columns, plus
//!   AND-combined per-column filters with list values expanded to ORs
//! - **Three Pagination Strategies**: Offset (count + envelope caching),
//!   streaming (bulk pages, count caching only), and cursor (stable under
//!   concurrent inserts)
//! - **Envelopes**: data + pagination + metadata + performance bundles,
//!   cacheable whole
//!
//! ## Guarantees
//!
//! - **Read-only**: The engine never mutates the row store and is safe to
//!   call concurrently without locking
//! - **No partial results**: Any storage failure surfaces as an error, never
//!   a truncated page
//! - **Cache-optional**: Every cache failure degrades to a miss; correctness
//!   never depends on the cache

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod paginate;
pub mod request;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::engine::QueryEngine;
    pub use crate::envelope::{QueryEnvelope, QueryMetadata, QueryPerformance, RowPayload};
    pub use crate::error::{Error, Result};
    pub use crate::paginate::{CursorPage, OffsetPage, Pagination};
    pub use crate::request::{PaginationStrategy, QueryRequest, SortOrder};
}

pub use engine::QueryEngine;
pub use envelope::{QueryEnvelope, QueryMetadata, QueryPerformance, RowPayload};
pub use error::{Error, Result};
pub use paginate::{CursorPage, OffsetPage, Pagination};
pub use request::{PaginationStrategy, QueryRequest, SortOrder};
