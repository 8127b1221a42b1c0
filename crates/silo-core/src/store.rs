//! Abstract row store contract and an in-memory implementation for testing.
//!
//! The durable row store is an external collaborator; no specific engine is
//! mandated. Backends must provide:
//!
//! - upload CRUD with newest-first listing per owner,
//! - bulk row insertion with store-assigned monotonically increasing IDs,
//! - filtered counting and filtered/ordered/sliced fetching,
//! - cascade deletion of an upload's rows.
//!
//! Filter semantics are defined in [`crate::row::RowFilter`]; a SQL-backed
//! implementation would translate them to `WHERE` clauses, the in-memory one
//! evaluates them directly.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::id::{RowId, UploadId};
use crate::row::{RowDraft, RowFilter, RowOrder, RowSlice, StoredRow};
use crate::upload::Upload;

/// Abstract interface to the durable row store.
#[async_trait]
pub trait RowStore: Send + Sync + 'static {
    /// Persists a new upload record.
    ///
    /// Returns `Error::InvalidInput` if an upload with the same ID exists.
    async fn create_upload(&self, upload: &Upload) -> Result<()>;

    /// Fetches an upload by ID. Returns `None` if it does not exist.
    async fn get_upload(&self, upload_id: UploadId) -> Result<Option<Upload>>;

    /// Replaces an existing upload record.
    ///
    /// Returns `Error::NotFound` if the upload does not exist.
    async fn update_upload(&self, upload: &Upload) -> Result<()>;

    /// Lists one owner's uploads, newest first.
    async fn list_uploads(&self, owner_id: &str) -> Result<Vec<Upload>>;

    /// Deletes an upload and cascades to all of its rows.
    ///
    /// Returns `Error::NotFound` if the upload does not exist.
    async fn delete_upload(&self, upload_id: UploadId) -> Result<()>;

    /// Bulk-inserts rows for an upload, returning how many were written.
    ///
    /// The store assigns each row a monotonically increasing identity in
    /// the order given.
    async fn insert_rows(&self, upload_id: UploadId, rows: Vec<RowDraft>) -> Result<u64>;

    /// Counts rows of an upload matching the filter.
    async fn count_rows(&self, upload_id: UploadId, filter: &RowFilter) -> Result<u64>;

    /// Fetches rows of an upload matching the filter, in the requested
    /// identity order, restricted to the requested slice.
    async fn fetch_rows(
        &self,
        upload_id: UploadId,
        filter: &RowFilter,
        order: RowOrder,
        slice: RowSlice,
    ) -> Result<Vec<StoredRow>>;

    /// Fetches the lowest-identity row of an upload, if any.
    ///
    /// The first row is the authority for the upload's column schema.
    async fn first_row(&self, upload_id: UploadId) -> Result<Option<StoredRow>>;
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory row store for testing.
///
/// Thread-safe via `RwLock`; rows live in a single `BTreeMap` keyed by
/// identity so ordered scans and cursor ranges come for free.
///
/// ## Limitations
///
/// - **NOT suitable for production**: no durability, no indexes
/// - **Single-process only**: state is not shared across processes
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    uploads: RwLock<HashMap<UploadId, Upload>>,
    rows: RwLock<BTreeMap<RowId, StoredRow>>,
    next_row_id: AtomicI64,
}

impl MemoryRowStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
            rows: RwLock::new(BTreeMap::new()),
            next_row_id: AtomicI64::new(1),
        }
    }

    /// Returns the number of uploads currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn upload_count(&self) -> Result<usize> {
        let count = {
            let uploads = self.uploads.read().map_err(poison_err)?;
            uploads.len()
        };
        Ok(count)
    }

    fn matching_rows(
        rows: &BTreeMap<RowId, StoredRow>,
        upload_id: UploadId,
        filter: &RowFilter,
    ) -> Vec<StoredRow> {
        rows.values()
            .filter(|row| row.upload_id == upload_id && filter.matches(&row.data))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn create_upload(&self, upload: &Upload) -> Result<()> {
        let mut uploads = self.uploads.write().map_err(poison_err)?;
        if uploads.contains_key(&upload.id) {
            return Err(Error::InvalidInput(format!(
                "upload already exists: {}",
                upload.id
            )));
        }
        uploads.insert(upload.id, upload.clone());
        Ok(())
    }

    async fn get_upload(&self, upload_id: UploadId) -> Result<Option<Upload>> {
        let result = {
            let uploads = self.uploads.read().map_err(poison_err)?;
            uploads.get(&upload_id).cloned()
        };
        Ok(result)
    }

    async fn update_upload(&self, upload: &Upload) -> Result<()> {
        let mut uploads = self.uploads.write().map_err(poison_err)?;
        if !uploads.contains_key(&upload.id) {
            return Err(Error::NotFound(format!("upload not found: {}", upload.id)));
        }
        uploads.insert(upload.id, upload.clone());
        Ok(())
    }

    async fn list_uploads(&self, owner_id: &str) -> Result<Vec<Upload>> {
        let mut result = {
            let uploads = self.uploads.read().map_err(poison_err)?;
            uploads
                .values()
                .filter(|u| u.owner.id == owner_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        result.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_ulid().cmp(&a.id.as_ulid()))
        });
        Ok(result)
    }

    async fn delete_upload(&self, upload_id: UploadId) -> Result<()> {
        {
            let mut uploads = self.uploads.write().map_err(poison_err)?;
            if uploads.remove(&upload_id).is_none() {
                return Err(Error::NotFound(format!("upload not found: {upload_id}")));
            }
        }
        let mut rows = self.rows.write().map_err(poison_err)?;
        rows.retain(|_, row| row.upload_id != upload_id);
        Ok(())
    }

    async fn insert_rows(&self, upload_id: UploadId, drafts: Vec<RowDraft>) -> Result<u64> {
        {
            let uploads = self.uploads.read().map_err(poison_err)?;
            if !uploads.contains_key(&upload_id) {
                return Err(Error::NotFound(format!("upload not found: {upload_id}")));
            }
        }

        let inserted = drafts.len() as u64;
        let now = Utc::now();
        let mut rows = self.rows.write().map_err(poison_err)?;
        for draft in drafts {
            let id = RowId::new(self.next_row_id.fetch_add(1, Ordering::SeqCst));
            rows.insert(
                id,
                StoredRow {
                    id,
                    upload_id,
                    data: draft.data,
                    created_at: now,
                },
            );
        }
        drop(rows);
        Ok(inserted)
    }

    async fn count_rows(&self, upload_id: UploadId, filter: &RowFilter) -> Result<u64> {
        let rows = self.rows.read().map_err(poison_err)?;
        let count = rows
            .values()
            .filter(|row| row.upload_id == upload_id && filter.matches(&row.data))
            .count() as u64;
        drop(rows);
        Ok(count)
    }

    async fn fetch_rows(
        &self,
        upload_id: UploadId,
        filter: &RowFilter,
        order: RowOrder,
        slice: RowSlice,
    ) -> Result<Vec<StoredRow>> {
        let rows = self.rows.read().map_err(poison_err)?;

        let result = match slice {
            RowSlice::Offset { offset, limit } => {
                let mut matched = Self::matching_rows(&rows, upload_id, filter);
                if order == RowOrder::IdDesc {
                    matched.reverse();
                }
                matched
                    .into_iter()
                    .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .collect()
            }
            RowSlice::After { cursor, limit } => rows
                .range((Bound::Excluded(cursor), Bound::Unbounded))
                .map(|(_, row)| row)
                .filter(|row| row.upload_id == upload_id && filter.matches(&row.data))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect(),
        };
        drop(rows);
        Ok(result)
    }

    async fn first_row(&self, upload_id: UploadId) -> Result<Option<StoredRow>> {
        let rows = self.rows.read().map_err(poison_err)?;
        let result = rows
            .values()
            .find(|row| row.upload_id == upload_id)
            .cloned();
        drop(rows);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::ColumnFilter;
    use crate::upload::Owner;
    use serde_json::json;

    fn draft(pairs: &[(&str, serde_json::Value)]) -> RowDraft {
        RowDraft::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    async fn seeded_upload(store: &MemoryRowStore) -> Result<Upload> {
        let upload = Upload::new(Owner::new("user-1"), "events.csv", "/tmp/events.csv");
        store.create_upload(&upload).await?;
        Ok(upload)
    }

    #[tokio::test]
    async fn create_get_update_upload() -> Result<()> {
        let store = MemoryRowStore::new();
        let mut upload = seeded_upload(&store).await?;

        let fetched = store.get_upload(upload.id).await?.unwrap();
        assert_eq!(fetched.original_filename, "events.csv");

        upload.total_rows = 10;
        store.update_upload(&upload).await?;
        assert_eq!(store.get_upload(upload.id).await?.unwrap().total_rows, 10);

        Ok(())
    }

    #[tokio::test]
    async fn create_duplicate_upload_rejected() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        let result = store.create_upload(&upload).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_upload_is_not_found() {
        let store = MemoryRowStore::new();
        let upload = Upload::new(Owner::new("user-1"), "a.csv", "/tmp/a.csv");
        let result = store.update_upload(&upload).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_uploads_newest_first_per_owner() -> Result<()> {
        let store = MemoryRowStore::new();
        let first = seeded_upload(&store).await?;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = seeded_upload(&store).await?;
        let other = Upload::new(Owner::new("user-2"), "b.csv", "/tmp/b.csv");
        store.create_upload(&other).await?;

        let listed = store.list_uploads("user-1").await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        Ok(())
    }

    #[tokio::test]
    async fn row_ids_are_monotonic_across_uploads() -> Result<()> {
        let store = MemoryRowStore::new();
        let a = seeded_upload(&store).await?;
        let b = seeded_upload(&store).await?;

        store.insert_rows(a.id, vec![draft(&[("n", json!(1))])]).await?;
        store.insert_rows(b.id, vec![draft(&[("n", json!(2))])]).await?;
        store.insert_rows(a.id, vec![draft(&[("n", json!(3))])]).await?;

        let rows_a = store
            .fetch_rows(
                a.id,
                &RowFilter::unfiltered(),
                RowOrder::IdAsc,
                RowSlice::Offset { offset: 0, limit: 10 },
            )
            .await?;
        assert_eq!(rows_a.len(), 2);
        assert!(rows_a[0].id < rows_a[1].id);
        Ok(())
    }

    #[tokio::test]
    async fn insert_into_missing_upload_fails() {
        let store = MemoryRowStore::new();
        let result = store
            .insert_rows(UploadId::generate(), vec![draft(&[("n", json!(1))])])
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn count_and_fetch_respect_filters() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        store
            .insert_rows(
                upload.id,
                vec![
                    draft(&[("status", json!("open"))]),
                    draft(&[("status", json!("closed"))]),
                    draft(&[("status", json!("stale"))]),
                ],
            )
            .await?;

        let filter = RowFilter {
            search: None,
            fields: vec![ColumnFilter {
                column: "status".into(),
                values: vec!["open".into(), "closed".into()],
            }],
        };

        assert_eq!(store.count_rows(upload.id, &filter).await?, 2);
        let rows = store
            .fetch_rows(
                upload.id,
                &filter,
                RowOrder::IdAsc,
                RowSlice::Offset { offset: 0, limit: 10 },
            )
            .await?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_desc_reverses_identity_order() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        store
            .insert_rows(
                upload.id,
                (0..5).map(|i| draft(&[("n", json!(i))])).collect(),
            )
            .await?;

        let rows = store
            .fetch_rows(
                upload.id,
                &RowFilter::unfiltered(),
                RowOrder::IdDesc,
                RowSlice::Offset { offset: 0, limit: 2 },
            )
            .await?;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id > rows[1].id);
        Ok(())
    }

    #[tokio::test]
    async fn cursor_slice_resumes_strictly_after() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        store
            .insert_rows(
                upload.id,
                (0..10).map(|i| draft(&[("n", json!(i))])).collect(),
            )
            .await?;

        let first = store
            .fetch_rows(
                upload.id,
                &RowFilter::unfiltered(),
                RowOrder::IdAsc,
                RowSlice::After { cursor: RowId::new(0), limit: 4 },
            )
            .await?;
        assert_eq!(first.len(), 4);

        let resumed = store
            .fetch_rows(
                upload.id,
                &RowFilter::unfiltered(),
                RowOrder::IdAsc,
                RowSlice::After { cursor: first.last().unwrap().id, limit: 100 },
            )
            .await?;
        assert_eq!(resumed.len(), 6);
        assert!(resumed[0].id > first[3].id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_upload_cascades_to_rows() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        let survivor = seeded_upload(&store).await?;
        store
            .insert_rows(upload.id, vec![draft(&[("n", json!(1))])])
            .await?;
        store
            .insert_rows(survivor.id, vec![draft(&[("n", json!(2))])])
            .await?;

        store.delete_upload(upload.id).await?;

        assert!(store.get_upload(upload.id).await?.is_none());
        assert_eq!(
            store.count_rows(upload.id, &RowFilter::unfiltered()).await?,
            0
        );
        assert_eq!(
            store
                .count_rows(survivor.id, &RowFilter::unfiltered())
                .await?,
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn first_row_returns_lowest_identity() -> Result<()> {
        let store = MemoryRowStore::new();
        let upload = seeded_upload(&store).await?;
        assert!(store.first_row(upload.id).await?.is_none());

        store
            .insert_rows(
                upload.id,
                vec![draft(&[("n", json!("a"))]), draft(&[("n", json!("b"))])],
            )
            .await?;

        let first = store.first_row(upload.id).await?.unwrap();
        assert_eq!(first.data["n"], json!("a"));
        Ok(())
    }
}
