//! Observability metrics for ingestion.
//!
//! Exposed via the `metrics` crate facade; install any compatible exporter
//! at application startup to publish them.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `silo_ingest_rows_total` | Counter | - | Rows persisted across all runs |
//! | `silo_ingest_chunks_total` | Counter | - | Windows processed |
//! | `silo_ingest_runs_total` | Counter | `status` | Terminal run outcomes |
//! | `silo_ingest_duration_seconds` | Histogram | `status` | Wall-clock run duration |

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: rows persisted across all ingestion runs.
    pub const ROWS_TOTAL: &str = "silo_ingest_rows_total";
    /// Counter: windows processed across all ingestion runs.
    pub const CHUNKS_TOTAL: &str = "silo_ingest_chunks_total";
    /// Counter: terminal run outcomes by status.
    pub const RUNS_TOTAL: &str = "silo_ingest_runs_total";
    /// Histogram: wall-clock run duration in seconds by status.
    pub const DURATION_SECONDS: &str = "silo_ingest_duration_seconds";
}

/// Recorder for ingestion metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestMetrics;

impl IngestMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records one processed window and its row count.
    pub fn record_chunk(&self, rows: u64) {
        counter!(names::CHUNKS_TOTAL).increment(1);
        counter!(names::ROWS_TOTAL).increment(rows);
    }

    /// Records a terminal run outcome and its duration.
    pub fn record_outcome(&self, status: &'static str, duration: Duration) {
        counter!(names::RUNS_TOTAL, "status" => status).increment(1);
        histogram!(names::DURATION_SECONDS, "status" => status).record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_an_exporter_is_a_noop() {
        let metrics = IngestMetrics::new();
        metrics.record_chunk(100);
        metrics.record_outcome("completed", Duration::from_millis(250));
    }
}
