//! Observability infrastructure: structured logging with consistent spans.
//!
//! This module provides initialization helpers and span constructors so that
//! ingestion and query operations log with the same fields everywhere.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::id::UploadId;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `silo_ingest=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for ingestion operations with standard fields.
#[must_use]
pub fn ingest_span(operation: &str, upload_id: UploadId) -> Span {
    tracing::info_span!(
        "ingest",
        op = operation,
        upload_id = %upload_id,
    )
}

/// Creates a span for query operations with standard fields.
#[must_use]
pub fn query_span(operation: &str, upload_id: UploadId) -> Span {
    tracing::info_span!(
        "query",
        op = operation,
        upload_id = %upload_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_spans() {
        let upload_id = UploadId::generate();
        let span = ingest_span("count_rows", upload_id);
        let _guard = span.enter();
        tracing::info!("message inside ingest span");

        let span = query_span("fetch_page", upload_id);
        let _guard = span.enter();
        tracing::info!("message inside query span");
    }
}
