//! Lifecycle notification on terminal ingestion outcomes.
//!
//! Once an ingestion reaches a terminal state, a summary report is assembled
//! from the upload record and its first stored row, then handed to an
//! external message-composition/delivery collaborator. Notification is
//! strictly best-effort: failures are logged by the caller and never reach
//! the ingestion path, and delivery is skipped silently when the owning
//! identity has no deliverable address.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;

use silo_core::{RowStore, UploadId, UploadStatus};

use crate::error::Result;

/// Summary statistics handed to the notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    /// The upload this report describes.
    pub upload_id: UploadId,
    /// Filename as originally submitted.
    pub original_filename: String,
    /// Where the message should go.
    pub recipient: String,
    /// Terminal status of the run.
    pub status: UploadStatus,
    /// Total rows counted in the source file.
    pub total_rows: i64,
    /// Rows persisted before the run ended.
    pub processed_rows: i64,
    /// Wall-clock processing duration in seconds, if the run completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Column names sampled from the first stored row.
    pub columns: Vec<String>,
    /// The first stored row, as a sample of the data.
    pub sample_row: Map<String, Value>,
    /// Errors accumulated across attempts.
    pub errors: Vec<String>,
}

/// Abstract "render and deliver a structured message" collaborator.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// Renders and delivers one report.
    async fn deliver(&self, report: &UploadReport) -> Result<()>;
}

/// A sink that records every delivered report, for tests.
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    reports: Mutex<Vec<UploadReport>>,
}

impl MemoryNotificationSink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every report delivered so far, in arrival order.
    #[must_use]
    pub fn delivered(&self) -> Vec<UploadReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn deliver(&self, report: &UploadReport) -> Result<()> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        Ok(())
    }
}

/// Assembles and delivers the terminal-outcome report for one upload.
///
/// Missing upload or missing recipient address both skip delivery silently.
///
/// # Errors
///
/// Returns an error only when the store fails or the sink rejects the
/// delivery; the caller is expected to log and continue.
pub async fn send_lifecycle_notice<S: RowStore>(
    store: &S,
    sink: &dyn NotificationSink,
    upload_id: UploadId,
) -> Result<()> {
    let Some(upload) = store.get_upload(upload_id).await? else {
        tracing::warn!(%upload_id, "upload not found for lifecycle notice");
        return Ok(());
    };

    let Some(recipient) = upload.owner.email.clone() else {
        tracing::debug!(%upload_id, "no recipient address, skipping lifecycle notice");
        return Ok(());
    };

    let (columns, sample_row) = match store.first_row(upload_id).await? {
        Some(row) => (row.data.keys().cloned().collect(), row.data),
        None => (Vec::new(), Map::new()),
    };

    let report = UploadReport {
        upload_id,
        original_filename: upload.original_filename.clone(),
        recipient,
        status: upload.status,
        total_rows: upload.total_rows,
        processed_rows: upload.processed_rows,
        duration_secs: upload
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0),
        columns,
        sample_row,
        errors: upload.errors.clone(),
    };

    sink.deliver(&report).await?;
    tracing::info!(%upload_id, recipient = %report.recipient, "lifecycle notice delivered");
    Ok(())
}
