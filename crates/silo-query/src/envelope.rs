//! The query response envelope.
//!
//! Every query returns the same four-part bundle: the row payloads, the
//! pagination metadata for the chosen strategy, the query metadata echo
//! (resolved schema plus the parameters that shaped the result), and
//! performance observations. Envelopes are serializable in both directions
//! because the offset strategy caches them whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use silo_core::{RowId, UploadId, UploadStatus};

use crate::paginate::Pagination;
use crate::request::SortOrder;

/// One row as it appears in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPayload {
    /// Store-assigned row identity.
    pub row_id: RowId,
    /// The (possibly projected) column data.
    pub data: Map<String, Value>,
    /// When the row was persisted.
    pub created_at: DateTime<Utc>,
}

/// Echo of the resolved schema and the parameters that shaped the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// The upload's resolved column schema.
    pub available_columns: Vec<String>,
    /// The free-text needle, when one was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    /// The requested sort key.
    pub sort_by: String,
    /// The requested sort direction.
    pub sort_order: SortOrder,
    /// The applied projection; `None` means all columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_filter: Option<Vec<String>>,
    /// The applied column filters, echoed as a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_filters: Option<Value>,
}

/// Performance observations for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPerformance {
    /// Wall-clock time spent serving the request, in milliseconds.
    pub response_time_ms: f64,
    /// Whether the envelope was served from the page cache.
    pub cached: bool,
    /// Row-store calls made while serving the request.
    pub query_count: u32,
}

/// The complete response for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    /// The queried upload.
    pub upload_id: UploadId,
    /// Its original filename.
    pub original_filename: String,
    /// Its lifecycle state (always `completed` for served queries).
    pub upload_status: UploadStatus,
    /// The row payloads.
    pub data: Vec<RowPayload>,
    /// Pagination metadata for the chosen strategy.
    pub pagination: Pagination,
    /// Schema and parameter echo.
    pub metadata: QueryMetadata,
    /// Performance observations.
    pub performance: QueryPerformance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::OffsetPage;
    use serde_json::json;

    #[test]
    fn envelope_roundtrips_through_json() {
        let mut data = Map::new();
        data.insert("name".into(), json!("ada"));

        let envelope = QueryEnvelope {
            upload_id: UploadId::generate(),
            original_filename: "events.csv".into(),
            upload_status: UploadStatus::Completed,
            data: vec![RowPayload {
                row_id: RowId::new(1),
                data,
                created_at: Utc::now(),
            }],
            pagination: Pagination::Offset(OffsetPage::compute(1, 100, 1)),
            metadata: QueryMetadata {
                available_columns: vec!["name".into()],
                search_query: None,
                sort_by: "id".into(),
                sort_order: SortOrder::Asc,
                columns_filter: None,
                applied_filters: None,
            },
            performance: QueryPerformance {
                response_time_ms: 1.5,
                cached: false,
                query_count: 2,
            },
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["upload_status"], "completed");
        assert_eq!(value["data"][0]["row_id"], 1);
        assert_eq!(value["pagination"]["current_page"], 1);

        let back: QueryEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
