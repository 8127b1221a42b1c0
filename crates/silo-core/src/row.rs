//! Persisted row records and the filter/order/slice vocabulary the row
//! store understands.
//!
//! A row's payload is an ordered mapping from normalized column name to an
//! untyped scalar (`string | number | null`). There is no global schema: the
//! column set is derived lazily from the first row of each upload, so filters
//! and ordering are expressed over column *names*, never over a record type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::id::{RowId, UploadId};

/// A row ready for insertion; the store assigns identity and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowDraft {
    /// Ordered column-name to scalar mapping.
    pub data: Map<String, Value>,
}

impl RowDraft {
    /// Creates a draft from an already-normalized mapping.
    #[must_use]
    pub const fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// A persisted row. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRow {
    /// Store-assigned, monotonically increasing identity.
    pub id: RowId,
    /// The upload this row belongs to.
    pub upload_id: UploadId,
    /// Ordered column-name to scalar mapping.
    pub data: Map<String, Value>,
    /// When the row was persisted.
    pub created_at: DateTime<Utc>,
}

/// An AND-combined filter over one upload's rows.
///
/// Semantics (every backend must implement these identically):
///
/// - `search` matches a row when *any* column's stringified value contains
///   the needle, case-insensitively.
/// - Each [`ColumnFilter`] matches when *any* of its values is contained in
///   the named column's stringified value, case-insensitively. All column
///   filters must match (AND across columns, OR within a column's values).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Free-text needle matched across every column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Per-column filters, AND-combined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ColumnFilter>,
}

/// A single column's filter: OR across its candidate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Normalized column name.
    pub column: String,
    /// Candidate substrings; a row matches on any of them.
    pub values: Vec<String>,
}

impl RowFilter {
    /// A filter that matches every row.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self::default()
    }

    /// Returns true if this filter matches every row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.fields.is_empty()
    }

    /// Evaluates the filter against one row payload.
    #[must_use]
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = data
                .values()
                .any(|value| scalar_text(value).to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        self.fields.iter().all(|field| {
            let cell = data.get(&field.column).map(scalar_text).unwrap_or_default();
            let cell = cell.to_lowercase();
            field
                .values
                .iter()
                .any(|candidate| cell.contains(&candidate.to_lowercase()))
        })
    }

    /// A stable SHA-256 fingerprint of the filter, for cache keys.
    ///
    /// Serialization is canonical enough for this purpose: field order is
    /// the insertion order the query layer produces deterministically.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        format!("{digest:x}")
    }
}

/// Stringifies a scalar cell for substring matching.
///
/// Nulls stringify to the empty string, which can never contain a non-empty
/// needle; strings are used verbatim (no surrounding quotes).
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Storage-level ordering for a row scan.
///
/// Only identity order is offered: arbitrary columns are not indexed, so the
/// engine keeps the scan cheap and defers column ordering to an in-memory
/// pass over the fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Ascending row identity (the canonical stable order).
    #[default]
    IdAsc,
    /// Descending row identity.
    IdDesc,
}

/// How to slice an ordered, filtered row scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSlice {
    /// Classic offset/limit window.
    Offset {
        /// Rows to skip.
        offset: u64,
        /// Maximum rows to return.
        limit: u64,
    },
    /// Cursor window: rows with identity strictly greater than `cursor`.
    After {
        /// Last-seen row identity.
        cursor: RowId,
        /// Maximum rows to return.
        limit: u64,
    },
}
