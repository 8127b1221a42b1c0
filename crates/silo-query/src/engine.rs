//! The query and pagination engine.
//!
//! Serves filtered, sorted, paginated views over one upload's rows without
//! ever materializing the dataset. The flow for a request:
//!
//! 1. load the upload and require `completed` status,
//! 2. validate and clamp the request parameters,
//! 3. for the offset strategy, try the whole-envelope cache first,
//! 4. resolve the upload's column schema (cache, else first row),
//! 5. build the row filter, silently dropping unknown columns,
//! 6. count (cached) and fetch the page via the chosen strategy,
//! 7. project columns, apply the deferred in-memory sort, assemble the
//!    envelope, and cache it (offset strategy, unless bypassed).
//!
//! Sorting by a non-identity column orders the *fetched page* in memory
//! rather than the whole filtered set: the columns are not indexed, so the
//! storage scan stays in identity order and the requested ordering is an
//! in-memory pass over at most one page of rows. The engine takes no locks
//! and is safe to call concurrently; read consistency is the row store's
//! concern.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use silo_core::cache::{self, keys};
use silo_core::row::scalar_text;
use silo_core::{
    CacheGateway, CacheStore, ColumnFilter, RowFilter, RowId, RowOrder, RowSlice, RowStore,
    UploadId, UploadStatus,
};

use crate::envelope::{QueryEnvelope, QueryMetadata, QueryPerformance, RowPayload};
use crate::error::{Error, Result};
use crate::metrics::QueryMetrics;
use crate::paginate::{CursorPage, OffsetPage, Pagination, clamp_page, clamp_page_size};
use crate::request::{PaginationStrategy, QueryRequest, SortOrder};

/// Read-only engine over the row store and cache collaborators.
pub struct QueryEngine<S, C> {
    store: Arc<S>,
    cache: CacheGateway<C>,
    metrics: QueryMetrics,
}

impl<S: RowStore, C: CacheStore> QueryEngine<S, C> {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<S>, cache: CacheGateway<C>) -> Self {
        Self {
            store,
            cache,
            metrics: QueryMetrics::new(),
        }
    }

    /// Serves one query, returning the full response envelope.
    ///
    /// # Errors
    ///
    /// - `Error::UploadNotFound` if the upload does not exist
    /// - `Error::NotReady` if it has not finished ingesting
    /// - `Error::Validation` for malformed filters
    /// - `Error::Query` for any storage failure (no partial results)
    #[tracing::instrument(skip(self, request), fields(upload_id = %upload_id, strategy = %request.strategy))]
    pub async fn query(
        &self,
        upload_id: UploadId,
        request: QueryRequest,
    ) -> Result<QueryEnvelope> {
        let started = Instant::now();
        let mut store_calls: u32 = 1;

        let upload = self
            .store
            .get_upload(upload_id)
            .await?
            .ok_or(Error::UploadNotFound(upload_id))?;
        if upload.status != UploadStatus::Completed {
            return Err(Error::NotReady {
                upload_id,
                status: upload.status,
            });
        }

        let parsed_filters = request.parsed_filters()?;
        let page = clamp_page(request.page);
        let page_size = clamp_page_size(request.page_size, request.strategy);

        let use_page_cache =
            request.strategy == PaginationStrategy::Offset && !request.bypass_cache;
        let page_key = keys::page(upload_id, &page_fingerprint(&request, page, page_size));

        if use_page_cache {
            if let Some(value) = self.cache.get(&page_key).await {
                match serde_json::from_value::<QueryEnvelope>(value) {
                    Ok(mut envelope) => {
                        envelope.performance.cached = true;
                        envelope.performance.response_time_ms = elapsed_ms(started);
                        self.metrics.record_query("offset", true, started.elapsed());
                        return Ok(envelope);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "cached envelope failed to decode, recomputing");
                    }
                }
            }
        }

        let schema = self.resolve_schema(upload_id, &mut store_calls).await?;

        // Unknown filter columns are dropped silently.
        let fields: Vec<ColumnFilter> = parsed_filters
            .into_iter()
            .filter(|f| schema.contains(&f.column))
            .collect();
        let search = request
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
        let filter = RowFilter { search, fields };

        let order = match (request.sort_by.as_str(), request.sort_order) {
            ("id", SortOrder::Desc) => RowOrder::IdDesc,
            _ => RowOrder::IdAsc,
        };

        let (rows, pagination) = match request.strategy {
            PaginationStrategy::Offset | PaginationStrategy::Streaming => {
                let total = self
                    .cached_count(upload_id, &filter, &mut store_calls)
                    .await?;
                store_calls += 1;
                let rows = self
                    .store
                    .fetch_rows(
                        upload_id,
                        &filter,
                        order,
                        RowSlice::Offset {
                            offset: (page - 1) * page_size,
                            limit: page_size,
                        },
                    )
                    .await?;
                (
                    rows,
                    Pagination::Offset(OffsetPage::compute(page, page_size, total)),
                )
            }
            PaginationStrategy::Cursor => {
                let cursor = request.cursor.map(RowId::new);
                store_calls += 1;
                // One sentinel row beyond the page detects has_next without
                // a count.
                let mut rows = self
                    .store
                    .fetch_rows(
                        upload_id,
                        &filter,
                        RowOrder::IdAsc,
                        RowSlice::After {
                            cursor: cursor.unwrap_or_default(),
                            limit: page_size + 1,
                        },
                    )
                    .await?;

                let has_next = rows.len() as u64 > page_size;
                if has_next {
                    rows.truncate(usize::try_from(page_size).unwrap_or(usize::MAX));
                }
                let has_previous = cursor.is_some();

                let pagination = Pagination::Cursor(CursorPage {
                    next_cursor: if has_next {
                        rows.last().map(|row| row.id)
                    } else {
                        None
                    },
                    previous_cursor: if has_previous {
                        rows.first()
                            .map(|row| RowId::new((row.id.value() - page_size as i64 - 1).max(0)))
                    } else {
                        None
                    },
                    has_next,
                    has_previous,
                    page_size,
                });
                (rows, pagination)
            }
        };

        let projection: Vec<String> = request
            .columns
            .iter()
            .filter(|c| schema.contains(*c))
            .cloned()
            .collect();
        let mut data: Vec<RowPayload> = rows
            .into_iter()
            .map(|row| {
                let data = if projection.is_empty() {
                    row.data
                } else {
                    projection
                        .iter()
                        .map(|c| (c.clone(), row.data.get(c).cloned().unwrap_or(Value::Null)))
                        .collect()
                };
                RowPayload {
                    row_id: row.id,
                    data,
                    created_at: row.created_at,
                }
            })
            .collect();

        // Deferred ordering for non-identity sort keys; page-local by
        // design.
        if request.sort_by != "id" && schema.contains(&request.sort_by) {
            sort_page(&mut data, &request.sort_by, request.sort_order);
        }

        let envelope = QueryEnvelope {
            upload_id,
            original_filename: upload.original_filename,
            upload_status: upload.status,
            data,
            pagination,
            metadata: QueryMetadata {
                available_columns: schema,
                search_query: filter.search,
                sort_by: request.sort_by.clone(),
                sort_order: request.sort_order,
                columns_filter: if projection.is_empty() {
                    None
                } else {
                    Some(projection)
                },
                applied_filters: request.filters_echo()?,
            },
            performance: QueryPerformance {
                response_time_ms: elapsed_ms(started),
                cached: false,
                query_count: store_calls,
            },
        };

        if use_page_cache {
            match serde_json::to_value(&envelope) {
                Ok(value) => self.cache.set(&page_key, value, cache::PAGE_TTL).await,
                Err(err) => tracing::warn!(error = %err, "envelope not cacheable, skipping"),
            }
        }

        self.metrics
            .record_query(strategy_label(request.strategy), false, started.elapsed());
        Ok(envelope)
    }

    /// Resolves the upload's column schema: cache, else first stored row.
    async fn resolve_schema(
        &self,
        upload_id: UploadId,
        store_calls: &mut u32,
    ) -> Result<Vec<String>> {
        let key = keys::columns(upload_id);
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(columns) = serde_json::from_value::<Vec<String>>(value) {
                return Ok(columns);
            }
        }

        *store_calls += 1;
        let columns: Vec<String> = match self.store.first_row(upload_id).await? {
            Some(row) => row.data.keys().cloned().collect(),
            None => Vec::new(),
        };

        if let Ok(value) = serde_json::to_value(&columns) {
            self.cache.set(&key, value, cache::COLUMNS_TTL).await;
        }
        Ok(columns)
    }

    /// Returns the filtered row count, caching it under the filter's
    /// fingerprint.
    async fn cached_count(
        &self,
        upload_id: UploadId,
        filter: &RowFilter,
        store_calls: &mut u32,
    ) -> Result<u64> {
        let key = keys::count(upload_id, &filter.fingerprint());
        if let Some(value) = self.cache.get(&key).await {
            if let Some(count) = value.as_u64() {
                return Ok(count);
            }
        }

        *store_calls += 1;
        let count = self.store.count_rows(upload_id, filter).await?;
        self.cache.set(&key, json!(count), cache::COUNT_TTL).await;
        Ok(count)
    }
}

/// Stable sort of one fetched page by a schema column.
///
/// Comparison is case-insensitive over the stringified value; ties keep
/// the incoming identity order because the sort is stable.
fn sort_page(data: &mut [RowPayload], sort_by: &str, order: SortOrder) {
    let key = |row: &RowPayload| {
        row.data
            .get(sort_by)
            .map(scalar_text)
            .unwrap_or_default()
            .to_lowercase()
    };
    match order {
        SortOrder::Asc => data.sort_by(|a, b| key(a).cmp(&key(b))),
        SortOrder::Desc => data.sort_by(|a, b| key(b).cmp(&key(a))),
    }
}

/// SHA-256 fingerprint of every parameter that shapes an offset page.
fn page_fingerprint(request: &QueryRequest, page: u64, page_size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.to_string());
    hasher.update("\u{1f}");
    hasher.update(page_size.to_string());
    hasher.update("\u{1f}");
    hasher.update(&request.sort_by);
    hasher.update("\u{1f}");
    hasher.update(request.sort_order.to_string());
    hasher.update("\u{1f}");
    hasher.update(request.search.as_deref().unwrap_or(""));
    hasher.update("\u{1f}");
    hasher.update(request.columns.join(","));
    hasher.update("\u{1f}");
    hasher.update(request.filters.as_deref().unwrap_or(""));
    format!("{:x}", hasher.finalize())
}

const fn strategy_label(strategy: PaginationStrategy) -> &'static str {
    match strategy {
        PaginationStrategy::Offset => "offset",
        PaginationStrategy::Streaming => "streaming",
        PaginationStrategy::Cursor => "cursor",
    }
}

/// Milliseconds elapsed since `started`, rounded to two decimals.
fn elapsed_ms(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
