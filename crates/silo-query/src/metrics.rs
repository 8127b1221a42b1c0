//! Observability metrics for the query engine.
//!
//! Exposed via the `metrics` crate facade; install any compatible exporter
//! at application startup to publish them.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `silo_query_requests_total` | Counter | `strategy`, `cached` | Served queries |
//! | `silo_query_duration_seconds` | Histogram | `strategy` | Wall-clock query latency |

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: served queries by strategy and cache outcome.
    pub const REQUESTS_TOTAL: &str = "silo_query_requests_total";
    /// Histogram: wall-clock query latency in seconds by strategy.
    pub const DURATION_SECONDS: &str = "silo_query_duration_seconds";
}

/// Recorder for query metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMetrics;

impl QueryMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records one served query.
    pub fn record_query(&self, strategy: &'static str, cached: bool, duration: Duration) {
        let cached = if cached { "hit" } else { "miss" };
        counter!(names::REQUESTS_TOTAL, "strategy" => strategy, "cached" => cached).increment(1);
        histogram!(names::DURATION_SECONDS, "strategy" => strategy)
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_an_exporter_is_a_noop() {
        QueryMetrics::new().record_query("offset", false, Duration::from_millis(12));
    }
}
