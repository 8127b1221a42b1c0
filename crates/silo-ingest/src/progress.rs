//! Progress reporting toward the external job runtime.
//!
//! The engine reports `{current, total, percent}` after every window through
//! a [`ProgressSink`]. Reporting is fire-and-forget: the trait is synchronous
//! and infallible so a slow or broken consumer can never stall ingestion.
//! Delivery order to observers is not guaranteed; the counters themselves are
//! monotonically non-decreasing within one run.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A point-in-time progress observation for one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Rows persisted so far.
    pub current: i64,
    /// Total rows in the source file.
    pub total: i64,
    /// Completion percentage, rounded to two decimals.
    pub percent: f64,
}

/// Structured state-update callback into the job runtime.
pub trait ProgressSink: Send + Sync {
    /// Receives one progress observation. Must not block.
    fn report(&self, update: ProgressUpdate);
}

/// A sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _update: ProgressUpdate) {}
}

/// A sink that records every update, for tests.
#[derive(Debug, Default)]
pub struct MemoryProgressSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl MemoryProgressSink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every update received so far, in arrival order.
    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn report(&self, update: ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}
