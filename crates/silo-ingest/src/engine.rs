//! The chunked ingestion engine.
//!
//! One call to [`IngestionEngine::ingest`] drives a full ingestion attempt:
//!
//! 1. transition the upload to `processing`, stamp the start time, and
//!    record the background job ID in the metadata bag,
//! 2. count total rows in one streaming pass,
//! 3. re-stream the file in fixed-size windows, normalizing headers and
//!    coercing cells, bulk-persisting each window in bounded sub-batches,
//! 4. after each window, persist the updated progress counters, write the
//!    percentage to the cache under a short TTL, and emit a fire-and-forget
//!    progress event,
//! 5. on exhaustion, transition to `completed` and kick off the lifecycle
//!    notification without blocking on it,
//! 6. on error, append the message to the upload's error list, transition
//!    to `failed`, and surface the error so the caller can retry.
//!
//! Chunk processing is strictly sequential: a window's bulk write and its
//! progress persistence complete before the next window is read. That bounds
//! memory and keeps `processed_rows` monotonic within one run. There is no
//! mid-chunk cancellation; a started window runs to completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use silo_core::cache::{self, keys};
use silo_core::{CacheGateway, CacheStore, JobId, Owner, RowStore, Upload, UploadId, UploadStatus};

use crate::error::{Error, Result};
use crate::metrics::IngestMetrics;
use crate::notify::{self, NotificationSink};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::reader::{self, CsvChunks};

/// Default rows per streaming window.
const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Default rows per bulk-insert sub-batch.
const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Tunables for one ingestion engine.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Rows per streaming window.
    pub chunk_size: usize,
    /// Rows per bulk-insert sub-batch; bounds per-call memory and
    /// transaction size.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    /// Sets the streaming window size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the bulk-insert sub-batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// The terminal result of one successful ingestion attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// The ingested upload.
    pub upload_id: UploadId,
    /// Rows persisted by this run.
    pub processed_rows: i64,
    /// Total rows counted in the source file.
    pub total_rows: i64,
    /// Terminal status (always `completed` on the success path).
    pub status: UploadStatus,
}

/// A point-in-time view of an upload's ingestion progress.
///
/// Serialized in snake_case: this is the wire shape polling callers see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Current lifecycle state.
    pub status: UploadStatus,
    /// Rows persisted so far.
    pub processed_rows: i64,
    /// Total rows, zero until the count pass completes.
    pub total_rows: i64,
    /// Completion percentage, rounded to two decimals.
    pub percent: f64,
}

/// Streams delimited files into the row store with bounded memory.
pub struct IngestionEngine<S, C> {
    store: Arc<S>,
    cache: CacheGateway<C>,
    config: IngestConfig,
    notifier: Option<Arc<dyn NotificationSink>>,
    metrics: IngestMetrics,
}

impl<S: RowStore, C: CacheStore> IngestionEngine<S, C> {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<S>, cache: CacheGateway<C>) -> Self {
        Self {
            store,
            cache,
            config: IngestConfig::default(),
            notifier: None,
            metrics: IngestMetrics::new(),
        }
    }

    /// Replaces the default tunables.
    #[must_use]
    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches the lifecycle notification collaborator.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Registers a pending upload for a stored source file.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSource` if the filename does not end in
    /// `.csv`, or a storage error if the record cannot be persisted. The
    /// size ceiling on source files is enforced by the submitting caller,
    /// not here.
    pub async fn register_upload(
        &self,
        owner: Owner,
        original_filename: &str,
        file_path: impl Into<PathBuf>,
    ) -> Result<Upload> {
        if !original_filename.to_lowercase().ends_with(".csv") {
            return Err(Error::InvalidSource(format!(
                "only .csv files are accepted, got '{original_filename}'"
            )));
        }

        let upload = Upload::new(owner, original_filename, file_path);
        self.store.create_upload(&upload).await?;
        tracing::info!(upload_id = %upload.id, filename = original_filename, "upload registered");
        Ok(upload)
    }

    /// Runs one ingestion attempt to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `Error::UploadNotFound` if the upload does not exist, a state
    /// error if the upload is not in an ingestible state (e.g. already
    /// completed), or the underlying failure after the upload has been
    /// marked `failed`. Callers retry by invoking `ingest` again; the
    /// `failed` state re-enters `processing`.
    #[tracing::instrument(skip(self, progress), fields(upload_id = %upload_id, job_id = %job_id))]
    pub async fn ingest(
        &self,
        upload_id: UploadId,
        job_id: JobId,
        progress: &dyn ProgressSink,
    ) -> Result<IngestOutcome> {
        let mut upload = self
            .store
            .get_upload(upload_id)
            .await?
            .ok_or(Error::UploadNotFound(upload_id))?;

        upload.transition_to(UploadStatus::Processing)?;
        upload.set_job_id(job_id);
        self.store.update_upload(&upload).await?;

        let started = Instant::now();
        match self.run_pipeline(&mut upload, progress).await {
            Ok(()) => {
                upload.transition_to(UploadStatus::Completed)?;
                self.store.update_upload(&upload).await?;
                self.metrics.record_outcome("completed", started.elapsed());
                tracing::info!(
                    processed_rows = upload.processed_rows,
                    total_rows = upload.total_rows,
                    "ingestion completed"
                );

                self.spawn_lifecycle_notice(upload_id);

                Ok(IngestOutcome {
                    upload_id,
                    processed_rows: upload.processed_rows,
                    total_rows: upload.total_rows,
                    status: upload.status,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, "ingestion attempt failed");
                upload.record_failure(err.to_string())?;
                if let Err(save_err) = self.store.update_upload(&upload).await {
                    tracing::error!(error = %save_err, "failed to persist failed state");
                }
                self.metrics.record_outcome("failed", started.elapsed());

                self.spawn_lifecycle_notice(upload_id);
                Err(err)
            }
        }
    }

    /// The fallible middle of an attempt: count pass plus windowed writes.
    async fn run_pipeline(
        &self,
        upload: &mut Upload,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let total = reader::count_rows(&upload.file_path)?;
        upload.total_rows = total;
        self.store.update_upload(upload).await?;
        tracing::info!(
            total_rows = total,
            path = %upload.file_path.display(),
            "starting chunked ingestion"
        );

        // Empty and header-only files complete immediately, with no
        // progress events required.
        if total == 0 {
            return Ok(());
        }

        let mut chunks = CsvChunks::open(&upload.file_path, self.config.chunk_size)?;
        let mut processed: i64 = 0;

        while let Some(chunk) = chunks.next_chunk()? {
            let window_rows = chunk.len() as i64;

            let mut drafts = chunk.into_iter();
            loop {
                let batch: Vec<_> = drafts.by_ref().take(self.config.batch_size).collect();
                if batch.is_empty() {
                    break;
                }
                self.store.insert_rows(upload.id, batch).await?;
            }

            processed += window_rows;
            upload.processed_rows = processed;
            self.store.update_upload(upload).await?;

            let percent = upload.progress_percent();
            self.cache
                .set(
                    &keys::progress(upload.id),
                    json!(percent),
                    cache::PROGRESS_TTL,
                )
                .await;
            progress.report(ProgressUpdate {
                current: processed,
                total,
                percent,
            });

            self.metrics.record_chunk(window_rows as u64);
            tracing::debug!(processed, total, percent, "window persisted");
        }

        Ok(())
    }

    /// Fetches an upload, surfacing absence as a typed error.
    ///
    /// # Errors
    ///
    /// Returns `Error::UploadNotFound` or a storage error.
    pub async fn get_upload(&self, upload_id: UploadId) -> Result<Upload> {
        self.store
            .get_upload(upload_id)
            .await?
            .ok_or(Error::UploadNotFound(upload_id))
    }

    /// Lists one owner's uploads, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the listing fails.
    pub async fn list_uploads(&self, owner_id: &str) -> Result<Vec<Upload>> {
        Ok(self.store.list_uploads(owner_id).await?)
    }

    /// Computes a point-in-time progress view for polling callers.
    ///
    /// # Errors
    ///
    /// Returns `Error::UploadNotFound` or a storage error.
    pub async fn progress_snapshot(&self, upload_id: UploadId) -> Result<ProgressSnapshot> {
        let upload = self.get_upload(upload_id).await?;
        Ok(ProgressSnapshot {
            status: upload.status,
            processed_rows: upload.processed_rows,
            total_rows: upload.total_rows,
            percent: upload.progress_percent(),
        })
    }

    /// Deletes an upload, cascading to its rows and best-effort
    /// invalidating every cache namespace scoped to it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` via the core error if the upload does not
    /// exist.
    pub async fn delete_upload(&self, upload_id: UploadId) -> Result<()> {
        self.store.delete_upload(upload_id).await?;
        for prefix in keys::upload_namespaces(upload_id) {
            self.cache.invalidate(&prefix).await;
        }
        tracing::info!(%upload_id, "upload and rows deleted");
        Ok(())
    }

    /// Fires the lifecycle notification without blocking ingestion.
    fn spawn_lifecycle_notice(&self, upload_id: UploadId) {
        let Some(sink) = self.notifier.clone() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) =
                notify::send_lifecycle_notice(store.as_ref(), sink.as_ref(), upload_id).await
            {
                tracing::warn!(%upload_id, error = %err, "lifecycle notification failed");
            }
        });
    }
}
