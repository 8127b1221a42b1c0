//! Query request parameters and their validation.
//!
//! A [`QueryRequest`] is what the external HTTP layer hands the engine after
//! decoding its query string: page/page-size, sort key and direction, a
//! free-text search needle, a column projection list, a raw JSON `filters`
//! object, a cache-bypass flag, the pagination strategy selector, and an
//! optional cursor. Everything has a default so `QueryRequest::default()`
//! is "first page, id order, no filters".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use silo_core::ColumnFilter;

use crate::error::{Error, Result};

/// Sort direction for the requested sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending (the default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// Which pagination strategy serves the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// Count-backed page slicing with count and envelope caching.
    #[default]
    Offset,
    /// Larger pages, count caching only; for bulk export-style reads.
    Streaming,
    /// Opaque-cursor paging, stable under concurrent inserts.
    Cursor,
}

impl std::fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offset => f.write_str("offset"),
            Self::Streaming => f.write_str("streaming"),
            Self::Cursor => f.write_str("cursor"),
        }
    }
}

/// One query against an ingested upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Requested page, clamped to ≥ 1.
    pub page: u64,
    /// Requested page size; `None` takes the strategy's default.
    pub page_size: Option<u64>,
    /// Sort key: `id` or any schema column name.
    pub sort_by: String,
    /// Sort direction.
    pub sort_order: SortOrder,
    /// Free-text needle, OR-matched across every column.
    pub search: Option<String>,
    /// Columns to project; empty means all.
    pub columns: Vec<String>,
    /// Raw JSON object of per-column filters, as received on the wire.
    pub filters: Option<String>,
    /// When set, the page cache is neither read nor written.
    pub bypass_cache: bool,
    /// Pagination strategy selector.
    pub strategy: PaginationStrategy,
    /// Last-seen row identity (cursor strategy only).
    pub cursor: Option<i64>,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
            sort_by: "id".to_string(),
            sort_order: SortOrder::Asc,
            search: None,
            columns: Vec::new(),
            filters: None,
            bypass_cache: false,
            strategy: PaginationStrategy::Offset,
            cursor: None,
        }
    }
}

impl QueryRequest {
    /// Sets the requested page.
    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Sets the requested page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets the sort key and direction.
    #[must_use]
    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = sort_order;
        self
    }

    /// Sets the free-text search needle.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Sets the column projection list.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the raw JSON filters object.
    #[must_use]
    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    /// Bypasses the page cache for this request.
    #[must_use]
    pub const fn with_bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Selects the pagination strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: PaginationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the cursor (cursor strategy).
    #[must_use]
    pub const fn with_cursor(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Parses the raw `filters` JSON into column filters.
    ///
    /// Accepted value shapes per column: a scalar (matched as one
    /// substring) or a list of scalars (OR of substrings). Null, empty
    /// strings, and empty lists are skipped. Column names are *not*
    /// validated here; the engine silently drops the ones missing from the
    /// upload's schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the text is not valid JSON, not an
    /// object, or a column value has an unsupported shape.
    pub fn parsed_filters(&self) -> Result<Vec<ColumnFilter>> {
        let Some(raw) = self.filters.as_deref().map(str::trim).filter(|s| !s.is_empty())
        else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("invalid filters JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(Error::Validation("filters must be a JSON object".into()));
        };

        let mut parsed = Vec::new();
        for (column, value) in map {
            let values = match value {
                Value::Null => continue,
                Value::String(s) if s.is_empty() => continue,
                Value::Array(items) if items.is_empty() => continue,
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| filter_scalar(&column, item))
                    .collect::<Result<Vec<_>>>()?,
                scalar => vec![filter_scalar(&column, scalar)?],
            };
            parsed.push(ColumnFilter { column, values });
        }
        Ok(parsed)
    }

    /// Echo of the parsed filters as a JSON object, for response metadata.
    ///
    /// Returns `None` when no filters were supplied.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::parsed_filters`].
    pub fn filters_echo(&self) -> Result<Option<Value>> {
        let parsed = self.parsed_filters()?;
        if parsed.is_empty() {
            return Ok(None);
        }
        let mut map = serde_json::Map::new();
        for filter in parsed {
            let values: Vec<Value> = filter.values.into_iter().map(Value::String).collect();
            let value = if values.len() == 1 {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            };
            map.insert(filter.column, value);
        }
        Ok(Some(Value::Object(map)))
    }
}

/// Stringifies one filter scalar, rejecting nested shapes.
fn filter_scalar(column: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Validation(format!(
            "filter '{column}' has unsupported value shape: {other}"
        ))),
    }
}
