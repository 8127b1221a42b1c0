//! Retrying front for the ingestion engine.
//!
//! The real job runtime is external; this runner models its contract so the
//! engine can be exercised end-to-end in one process: schedule an ingestion
//! by upload identity, hand it a progress sink, and on failure resubmit the
//! whole attempt up to a fixed ceiling with a fixed backoff delay. After the
//! ceiling is exhausted the upload remains `failed` permanently.
//!
//! Retry is a state machine edge, not control flow: each resubmission
//! re-enters `processing` from `failed` through the upload's own
//! `transition_to`, so an exhausted upload is observably failed with every
//! attempt's error in its list.

use std::sync::Arc;
use std::time::Duration;

use silo_core::{CacheStore, JobId, RowStore, UploadId};

use crate::engine::{IngestOutcome, IngestionEngine};
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

/// Default attempt ceiling.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Bounded-retry policy for ingestion runs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before giving up (first run included).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the fixed backoff delay.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Drives ingestion attempts under a retry policy.
pub struct IngestRunner<S, C> {
    engine: Arc<IngestionEngine<S, C>>,
    policy: RetryPolicy,
}

impl<S: RowStore, C: CacheStore> IngestRunner<S, C> {
    /// Creates a runner with the default policy.
    #[must_use]
    pub fn new(engine: Arc<IngestionEngine<S, C>>) -> Self {
        Self {
            engine,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs one upload's ingestion to a terminal outcome.
    ///
    /// Generates a job ID shared across every attempt of this submission so
    /// observers can correlate retries.
    ///
    /// # Errors
    ///
    /// Returns `Error::RetriesExhausted` once the attempt ceiling is hit;
    /// the upload stays `failed` and is not resubmitted.
    #[tracing::instrument(skip(self, progress), fields(upload_id = %upload_id))]
    pub async fn run(
        &self,
        upload_id: UploadId,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<IngestOutcome> {
        let job_id = JobId::generate();
        let mut attempt = 1;

        loop {
            match self.engine.ingest(upload_id, job_id, progress.as_ref()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        tracing::error!(
                            attempt,
                            error = %err,
                            "retry ceiling exhausted, upload stays failed"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }

                    tracing::warn!(
                        attempt,
                        backoff_secs = self.policy.backoff.as_secs_f64(),
                        error = %err,
                        "ingestion attempt failed, backing off"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IngestConfig;
    use crate::progress::NullProgressSink;
    use silo_core::{CacheGateway, MemoryCache, MemoryRowStore, Owner, RowFilter, UploadStatus};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn runner(
        policy: RetryPolicy,
    ) -> (
        Arc<MemoryRowStore>,
        Arc<IngestionEngine<MemoryRowStore, MemoryCache>>,
        IngestRunner<MemoryRowStore, MemoryCache>,
    ) {
        let store = Arc::new(MemoryRowStore::new());
        let engine = Arc::new(
            IngestionEngine::new(Arc::clone(&store), CacheGateway::new(MemoryCache::new()))
                .with_config(IngestConfig::default().with_chunk_size(8)),
        );
        let runner = IngestRunner::new(Arc::clone(&engine)).with_policy(policy);
        (store, engine, runner)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() -> Result<()> {
        let (store, engine, runner) = runner(fast_policy());
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"n\n1\n2\n").unwrap();
        file.flush().unwrap();

        let upload = engine
            .register_upload(Owner::new("u1"), "n.csv", file.path())
            .await?;
        let outcome = runner.run(upload.id, Arc::new(NullProgressSink)).await?;

        assert_eq!(outcome.status, UploadStatus::Completed);
        assert_eq!(
            store
                .count_rows(upload.id, &RowFilter::unfiltered())
                .await?,
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_retries_leave_upload_failed() -> Result<()> {
        let (store, engine, runner) = runner(fast_policy());
        let upload = engine
            .register_upload(Owner::new("u1"), "ghost.csv", "/nonexistent/ghost.csv")
            .await?;

        let result = runner.run(upload.id, Arc::new(NullProgressSink)).await;
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));

        let stored = store.get_upload(upload.id).await?.unwrap();
        assert_eq!(stored.status, UploadStatus::Failed);
        // One error recorded per attempt.
        assert_eq!(stored.errors.len(), 3);
        assert!(stored.completed_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn one_attempt_policy_fails_immediately() -> Result<()> {
        let (_store, engine, runner) =
            runner(fast_policy().with_max_attempts(1));
        let upload = engine
            .register_upload(Owner::new("u1"), "ghost.csv", "/nonexistent/ghost.csv")
            .await?;

        let result = runner.run(upload.id, Arc::new(NullProgressSink)).await;
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 1, .. })
        ));
        Ok(())
    }
}
