//! End-to-end flow: register a file, ingest it in chunks, then page
//! through the persisted rows with each strategy.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use silo_core::{CacheGateway, MemoryCache, MemoryRowStore, Owner, RowStore, UploadStatus};
use silo_ingest::{IngestConfig, IngestRunner, IngestionEngine, NullProgressSink, RetryPolicy};
use silo_query::{Pagination, PaginationStrategy, QueryEngine, QueryRequest, SortOrder};

fn sample_csv(rows: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "User ID,Status,2nd Name").unwrap();
    for i in 0..rows {
        let status = if i % 2 == 0 { "open" } else { "closed" };
        writeln!(file, "{i},{status},person-{i}").unwrap();
    }
    file.flush().unwrap();
    file
}

struct Stack {
    store: Arc<MemoryRowStore>,
    ingest: Arc<IngestionEngine<MemoryRowStore, MemoryCache>>,
    query: QueryEngine<MemoryRowStore, MemoryCache>,
}

fn stack() -> Stack {
    let store = Arc::new(MemoryRowStore::new());
    let ingest = Arc::new(
        IngestionEngine::new(Arc::clone(&store), CacheGateway::new(MemoryCache::new()))
            .with_config(IngestConfig::default().with_chunk_size(64).with_batch_size(16)),
    );
    let query = QueryEngine::new(Arc::clone(&store), CacheGateway::new(MemoryCache::new()));
    Stack {
        store,
        ingest,
        query,
    }
}

#[tokio::test]
async fn ingest_then_page_through_every_strategy() {
    let stack = stack();
    let file = sample_csv(230);

    let upload = stack
        .ingest
        .register_upload(Owner::new("u1"), "people.csv", file.path())
        .await
        .unwrap();

    let runner = IngestRunner::new(Arc::clone(&stack.ingest))
        .with_policy(RetryPolicy::default().with_backoff(std::time::Duration::from_millis(1)));
    let outcome = runner
        .run(upload.id, Arc::new(NullProgressSink))
        .await
        .unwrap();
    assert_eq!(outcome.status, UploadStatus::Completed);
    assert_eq!(outcome.total_rows, 230);

    // Offset strategy: page 3 of 100 holds the remainder.
    let envelope = stack
        .query
        .query(
            upload.id,
            QueryRequest::default().with_page(3).with_page_size(100),
        )
        .await
        .unwrap();
    assert_eq!(envelope.data.len(), 30);
    assert_eq!(
        envelope.metadata.available_columns,
        ["user_id", "status", "col_2nd_name"]
    );
    let Pagination::Offset(page) = &envelope.pagination else {
        panic!("expected offset pagination");
    };
    assert_eq!(page.total_count, 230);
    assert!(!page.has_next);

    // Cursor strategy: walk the whole upload without overlaps.
    let mut cursor: Option<i64> = None;
    let mut seen = Vec::new();
    loop {
        let mut request = QueryRequest::default()
            .with_strategy(PaginationStrategy::Cursor)
            .with_page_size(100);
        if let Some(c) = cursor {
            request = request.with_cursor(c);
        }
        let envelope = stack.query.query(upload.id, request).await.unwrap();
        seen.extend(envelope.data.iter().map(|r| r.row_id.value()));

        let Pagination::Cursor(page) = &envelope.pagination else {
            panic!("expected cursor pagination");
        };
        match page.next_cursor {
            Some(next) => cursor = Some(next.value()),
            None => break,
        }
    }
    assert_eq!(seen.len(), 230);
    let mut deduped = seen.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), 230);

    // Filtered search stays consistent with the ingested data.
    let envelope = stack
        .query
        .query(
            upload.id,
            QueryRequest::default()
                .with_filters(r#"{"status": "open"}"#)
                .with_page_size(500)
                .with_sort("col_2nd_name", SortOrder::Asc),
        )
        .await
        .unwrap();
    assert_eq!(envelope.data.len(), 115);
    assert!(envelope
        .data
        .iter()
        .all(|r| r.data["status"] == serde_json::json!("open")));
}

#[tokio::test]
async fn querying_before_ingest_reports_not_ready() {
    let stack = stack();
    let file = sample_csv(5);
    let upload = stack
        .ingest
        .register_upload(Owner::new("u1"), "people.csv", file.path())
        .await
        .unwrap();

    let result = stack.query.query(upload.id, QueryRequest::default()).await;
    assert!(matches!(
        result,
        Err(silo_query::Error::NotReady {
            status: UploadStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn deleting_an_upload_removes_every_row() {
    let stack = stack();
    let file = sample_csv(12);
    let upload = stack
        .ingest
        .register_upload(Owner::new("u1"), "people.csv", file.path())
        .await
        .unwrap();
    let runner = IngestRunner::new(Arc::clone(&stack.ingest));
    runner
        .run(upload.id, Arc::new(NullProgressSink))
        .await
        .unwrap();

    stack.ingest.delete_upload(upload.id).await.unwrap();

    assert!(stack.store.get_upload(upload.id).await.unwrap().is_none());
    assert_eq!(
        stack
            .store
            .count_rows(upload.id, &silo_core::RowFilter::unfiltered())
            .await
            .unwrap(),
        0
    );
}
