//! Upload lifecycle state and metadata.
//!
//! An [`Upload`] tracks one ingestion job from file registration to its
//! terminal outcome:
//!
//! - **Identity**: who owns it, which file it came from
//! - **Progress**: total and processed row counters
//! - **State**: an explicit state machine with validated transitions
//! - **Diagnostics**: an ordered error list and an open metadata bag
//!
//! The upload record is owned exclusively by the ingestion engine while the
//! job is running; the query engine treats it as read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::id::{JobId, UploadId};

/// Metadata key under which the background job identifier is recorded.
pub const JOB_ID_METADATA_KEY: &str = "job_id";

/// Upload state machine states.
///
/// States follow a directed graph:
///
/// ```text
/// ┌─────────┐  scheduled   ┌────────────┐  all chunks   ┌───────────┐
/// │ PENDING │─────────────►│ PROCESSING │──────────────►│ COMPLETED │
/// └─────────┘              └────────────┘               └───────────┘
///                            │       ▲
///                       error│       │retry (bounded,
///                            ▼       │ external scheduler)
///                          ┌────────┐│
///                          │ FAILED │┘
///                          └────────┘
/// ```
///
/// `FAILED -> PROCESSING` is the retry re-entry edge: the external job
/// runtime may resubmit a failed ingestion up to its attempt ceiling.
/// `COMPLETED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Created, waiting for the job runtime to pick it up.
    #[default]
    Pending,
    /// Actively streaming and persisting chunks.
    Processing,
    /// All rows persisted successfully.
    Completed,
    /// Ingestion aborted with an error (may be retried).
    Failed,
}

impl UploadStatus {
    /// Returns true if this is a terminal state that can never be left.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the external scheduler may re-enter processing
    /// from this state.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(target, Self::Processing),
            Self::Processing => matches!(target, Self::Completed | Self::Failed),
            Self::Failed => matches!(target, Self::Processing),
            Self::Completed => false,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Reference to the identity that owns an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// Opaque owner identifier (managed by the external identity system).
    pub id: String,
    /// Deliverable address for lifecycle notifications, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Owner {
    /// Creates an owner reference without a deliverable address.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    /// Creates an owner reference with a deliverable address.
    #[must_use]
    pub fn with_email(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
        }
    }
}

/// One ingestion job's metadata and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    /// Unique upload identifier.
    pub id: UploadId,
    /// Owning identity.
    pub owner: Owner,
    /// Filename as submitted by the caller.
    pub original_filename: String,
    /// Where the source file was stored for ingestion.
    pub file_path: PathBuf,
    /// Total data rows in the source file. Zero until the count pass runs.
    #[serde(default)]
    pub total_rows: i64,
    /// Rows persisted so far. Monotonically non-decreasing while processing.
    #[serde(default)]
    pub processed_rows: i64,
    /// Lifecycle state.
    pub status: UploadStatus,
    /// Ordered list of error messages accumulated across attempts.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Open key-value bag; holds the background job ID among other things.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the upload record was created.
    pub created_at: DateTime<Utc>,
    /// When processing last started. Reset on each retry attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When processing completed. Set on the completed transition only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Upload {
    /// Creates a pending upload record for a stored source file.
    #[must_use]
    pub fn new(
        owner: Owner,
        original_filename: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: UploadId::generate(),
            owner,
            original_filename: original_filename.into(),
            file_path: file_path.into(),
            total_rows: 0,
            processed_rows: 0,
            status: UploadStatus::Pending,
            errors: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Transitions to a new state, recording lifecycle timestamps.
    ///
    /// Entering `Processing` stamps `started_at`; entering `Completed`
    /// stamps `completed_at`. A failed upload keeps `completed_at` unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is invalid.
    #[tracing::instrument(
        skip(self),
        fields(upload_id = %self.id, from = %self.status, to = %target)
    )]
    pub fn transition_to(&mut self, target: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
                reason: format!("upload {} cannot move backward", self.id),
            });
        }

        let now = Utc::now();
        match target {
            UploadStatus::Processing => {
                self.started_at = Some(now);
            }
            UploadStatus::Completed => {
                self.completed_at = Some(now);
            }
            UploadStatus::Pending | UploadStatus::Failed => {}
        }

        self.status = target;
        Ok(())
    }

    /// Appends an error message and transitions to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload is not currently processing.
    pub fn record_failure(&mut self, message: impl Into<String>) -> Result<()> {
        self.errors.push(message.into());
        self.transition_to(UploadStatus::Failed)
    }

    /// Records the background job identifier into the metadata bag.
    pub fn set_job_id(&mut self, job_id: JobId) {
        self.metadata.insert(
            JOB_ID_METADATA_KEY.to_string(),
            Value::String(job_id.to_string()),
        );
    }

    /// Returns the recorded background job identifier, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        self.metadata.get(JOB_ID_METADATA_KEY).and_then(Value::as_str)
    }

    /// Completion percentage, rounded to two decimals.
    ///
    /// Zero while `total_rows` is unknown (or genuinely zero).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.total_rows <= 0 {
            return 0.0;
        }
        let raw = self.processed_rows as f64 / self.total_rows as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }

    /// Wall-clock processing duration, once both timestamps are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_upload() -> Upload {
        Upload::new(Owner::new("user-1"), "events.csv", "/tmp/events.csv")
    }

    #[test]
    fn status_happy_path_transitions() {
        let status = UploadStatus::Pending;
        assert!(status.can_transition_to(UploadStatus::Processing));
        assert!(!status.can_transition_to(UploadStatus::Completed));

        let status = UploadStatus::Processing;
        assert!(status.can_transition_to(UploadStatus::Completed));
        assert!(status.can_transition_to(UploadStatus::Failed));
        assert!(!status.can_transition_to(UploadStatus::Pending));
    }

    #[test]
    fn status_failed_reenters_processing_only() {
        let status = UploadStatus::Failed;
        assert!(status.can_transition_to(UploadStatus::Processing));
        assert!(!status.can_transition_to(UploadStatus::Completed));
        assert!(!status.can_transition_to(UploadStatus::Pending));
    }

    #[test]
    fn status_completed_is_terminal() {
        let status = UploadStatus::Completed;
        assert!(status.is_terminal());
        assert!(!status.can_transition_to(UploadStatus::Processing));
        assert!(!status.can_transition_to(UploadStatus::Failed));
    }

    #[test]
    fn transition_records_timestamps() -> crate::error::Result<()> {
        let mut upload = pending_upload();
        assert!(upload.started_at.is_none());

        upload.transition_to(UploadStatus::Processing)?;
        assert!(upload.started_at.is_some());
        assert!(upload.completed_at.is_none());

        upload.transition_to(UploadStatus::Completed)?;
        assert!(upload.completed_at.is_some());
        assert!(upload.duration().is_some());
        Ok(())
    }

    #[test]
    fn failed_upload_has_no_completed_at() -> crate::error::Result<()> {
        let mut upload = pending_upload();
        upload.transition_to(UploadStatus::Processing)?;
        upload.record_failure("disk on fire")?;

        assert_eq!(upload.status, UploadStatus::Failed);
        assert_eq!(upload.errors, vec!["disk on fire".to_string()]);
        assert!(upload.completed_at.is_none());
        Ok(())
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut upload = pending_upload();
        let result = upload.transition_to(UploadStatus::Completed);
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
        assert_eq!(upload.status, UploadStatus::Pending);
    }

    #[test]
    fn retry_reentry_restamps_started_at() -> crate::error::Result<()> {
        let mut upload = pending_upload();
        upload.transition_to(UploadStatus::Processing)?;
        let first_start = upload.started_at;
        upload.record_failure("transient")?;

        upload.transition_to(UploadStatus::Processing)?;
        assert_eq!(upload.status, UploadStatus::Processing);
        assert!(upload.started_at >= first_start);
        Ok(())
    }

    #[test]
    fn progress_percent_handles_zero_total() {
        let mut upload = pending_upload();
        assert!((upload.progress_percent() - 0.0).abs() < f64::EPSILON);

        upload.total_rows = 3;
        upload.processed_rows = 1;
        assert!((upload.progress_percent() - 33.33).abs() < 1e-9);

        upload.processed_rows = 3;
        assert!((upload.progress_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn job_id_roundtrips_through_metadata() {
        let mut upload = pending_upload();
        assert!(upload.job_id().is_none());

        let job_id = JobId::generate();
        upload.set_job_id(job_id);
        assert_eq!(upload.job_id(), Some(job_id.to_string().as_str()));
    }

    #[test]
    fn serde_uses_snake_case_status() {
        let upload = pending_upload();
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("startedAt").is_none());
    }
}
