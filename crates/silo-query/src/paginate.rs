//! Pagination strategies and their metadata math.
//!
//! Three strategies serve different read shapes:
//!
//! - **Offset**: count-backed page slicing; the workhorse for interactive
//!   browsing. Page sizes clamp to `[1, 500]`.
//! - **Streaming**: the same slicing with larger permitted pages
//!   (`[100, 5000]`) and no response caching; for bulk export-style reads
//!   where caching has low value.
//! - **Cursor**: the caller replays the last-seen row identity; the engine
//!   over-fetches by one row to detect a next page cheaply. Immune to the
//!   page drift offset arithmetic suffers under concurrent inserts.

use serde::{Deserialize, Serialize};

use silo_core::RowId;

use crate::request::PaginationStrategy;

/// Default page size for the offset and cursor strategies.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Maximum page size for the offset and cursor strategies.
pub const MAX_PAGE_SIZE: u64 = 500;

/// Default page size for the streaming strategy.
pub const STREAMING_DEFAULT_PAGE_SIZE: u64 = 1_000;

/// Minimum page size for the streaming strategy.
pub const STREAMING_MIN_PAGE_SIZE: u64 = 100;

/// Maximum page size for the streaming strategy.
pub const STREAMING_MAX_PAGE_SIZE: u64 = 5_000;

/// Clamps a requested page number to ≥ 1.
#[must_use]
pub fn clamp_page(page: u64) -> u64 {
    page.max(1)
}

/// Clamps a requested page size to the strategy's permitted range.
#[must_use]
pub fn clamp_page_size(requested: Option<u64>, strategy: PaginationStrategy) -> u64 {
    match strategy {
        PaginationStrategy::Offset | PaginationStrategy::Cursor => requested
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
        PaginationStrategy::Streaming => requested
            .unwrap_or(STREAMING_DEFAULT_PAGE_SIZE)
            .clamp(STREAMING_MIN_PAGE_SIZE, STREAMING_MAX_PAGE_SIZE),
    }
}

/// Offset/streaming pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPage {
    /// The served page, 1-based.
    pub current_page: u64,
    /// The clamped page size.
    pub page_size: u64,
    /// Total rows matching the filter.
    pub total_count: u64,
    /// Total pages at this page size; zero when there are no rows.
    pub total_pages: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
    /// The next page number, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u64>,
    /// The previous page number, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<u64>,
    /// 1-based index of the first row on this page.
    pub range_start: u64,
    /// 1-based index of the last row on this page.
    pub range_end: u64,
}

impl OffsetPage {
    /// Computes the full metadata for one page of a counted result set.
    #[must_use]
    pub fn compute(current_page: u64, page_size: u64, total_count: u64) -> Self {
        let total_pages = if total_count > 0 {
            total_count.div_ceil(page_size)
        } else {
            0
        };
        let has_next = total_pages > 0 && current_page < total_pages;
        let has_prev = current_page > 1;

        Self {
            current_page,
            page_size,
            total_count,
            total_pages,
            has_next,
            has_prev,
            next_page: has_next.then(|| current_page + 1),
            prev_page: has_prev.then(|| current_page - 1),
            range_start: (current_page - 1) * page_size + 1,
            range_end: (current_page * page_size).min(total_count),
        }
    }
}

/// Cursor pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage {
    /// Cursor to replay for the next page, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<RowId>,
    /// Cursor approximating the previous page's start, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_cursor: Option<RowId>,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether the request itself carried a cursor.
    pub has_previous: bool,
    /// The clamped page size.
    pub page_size: u64,
}

/// The pagination block of a response envelope, shaped by strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pagination {
    /// Offset or streaming metadata.
    Offset(OffsetPage),
    /// Cursor metadata.
    Cursor(CursorPage),
}
