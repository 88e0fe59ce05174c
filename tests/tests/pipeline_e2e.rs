//! Full pipeline scenario tests: ingress -> fingerprint -> issues ->
//! partition store -> compaction.
//!
//! The queue transport is mocked; this drives the same aggregation and
//! storage code the ingest worker runs on captured events.

use std::sync::Arc;

use object_store::memory::InMemory;
use object_store::ObjectStore;

use event_store::compaction::{compact, read_partition, CompactionFilters};
use event_store::{BufferConfig, CompactionConfig, PartitionKey, PartitionWriter};
use integration_tests::fixtures::*;
use integration_tests::setup::TestContext;
use metadata_store::{IssueStatus, IssueStore};
use pipeline_core::{fingerprint, EventRecord, EventType};

/// Run captured events through aggregation and storage, the way the
/// ingest worker does after fetching them from the queue.
async fn drain_to_stores(
    events: Vec<EventRecord>,
    issues: &IssueStore,
    writer: &PartitionWriter,
) {
    for event in events {
        let print = fingerprint(&event);
        issues
            .find_or_create_and_bump(&event.project_id, &print, &event)
            .expect("aggregation failed");
        writer.write(event).await.expect("buffering failed");
    }
    writer.flush().await.expect("flush failed");
}

#[tokio::test]
async fn test_double_submit_groups_into_one_issue() {
    let ctx = TestContext::new();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let issues = IssueStore::open_in_memory().unwrap();
    let writer = PartitionWriter::new(store.clone(), BufferConfig::default());

    // The same error event submitted twice.
    let payload = single_payload(error_event("NSInvalidArgumentException"));
    ctx.ingest(payload.clone()).await.assert_status_ok();
    ctx.ingest(payload).await.assert_status_ok();

    let captured = ctx.captured_events();
    assert_eq!(captured.len(), 2);

    drain_to_stores(captured.clone(), &issues, &writer).await;

    // Exactly one issue with two occurrences, still open.
    assert_eq!(issues.count_for_project(TEST_PROJECT).unwrap(), 1);
    let print = fingerprint(&captured[0]);
    let issue = issues.get(TEST_PROJECT, &print).unwrap().unwrap();
    assert_eq!(issue.occurrence_count, 2);
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(issue.title, "NSInvalidArgumentException: something went sideways");

    // Both records are in the error partition for that date.
    let key = PartitionKey::from_event(&captured[0]);
    assert_eq!(key.event_type, EventType::Error);
    let records = read_partition(&store, &key).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_distinct_exceptions_make_distinct_issues() {
    let ctx = TestContext::new();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let issues = IssueStore::open_in_memory().unwrap();
    let writer = PartitionWriter::new(store, BufferConfig::default());

    ctx.ingest(array_payload(vec![
        error_event("NSInvalidArgumentException"),
        error_event("NSRangeException"),
        error_event("NSInvalidArgumentException"),
    ]))
    .await
    .assert_status_ok();

    drain_to_stores(ctx.captured_events(), &issues, &writer).await;

    assert_eq!(issues.count_for_project(TEST_PROJECT).unwrap(), 2);
}

#[tokio::test]
async fn test_affected_users_across_submissions() {
    let ctx = TestContext::new();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let issues = IssueStore::open_in_memory().unwrap();
    let writer = PartitionWriter::new(store, BufferConfig::default());

    ctx.ingest(array_payload(vec![
        error_event_for_user("SIGSEGV", "alice"),
        error_event_for_user("SIGSEGV", "bob"),
        error_event_for_user("SIGSEGV", "alice"),
    ]))
    .await
    .assert_status_ok();

    let captured = ctx.captured_events();
    drain_to_stores(captured.clone(), &issues, &writer).await;

    let print = fingerprint(&captured[0]);
    let issue = issues.get(TEST_PROJECT, &print).unwrap().unwrap();
    assert_eq!(issue.occurrence_count, 3);
    assert_eq!(issue.affected_users, 2);
}

#[tokio::test]
async fn test_write_then_compact_round_trip() {
    let ctx = TestContext::new();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let issues = IssueStore::open_in_memory().unwrap();
    let writer = PartitionWriter::new(store.clone(), BufferConfig::default());

    // Three separate submissions, each flushed to its own block.
    for i in 0..3 {
        ctx.clear_captured();
        ctx.ingest(array_payload(vec![log_event(&format!("round {}", i))]))
            .await
            .assert_status_ok();
        drain_to_stores(ctx.captured_events(), &issues, &writer).await;
    }

    let key = {
        ctx.clear_captured();
        ctx.ingest(single_payload(log_event("probe"))).await.assert_status_ok();
        PartitionKey::from_event(&ctx.captured_events()[0])
    };

    let before = read_partition(&store, &key).await.unwrap();
    assert_eq!(before.len(), 3);

    let summary = compact(
        &store,
        &CompactionFilters::default(),
        &CompactionConfig::default(),
        false,
    )
    .await
    .unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.files_removed, 3);
    assert_eq!(summary.blocks_created, 1);
    assert_eq!(summary.total_events, 3);

    // Same events readable afterward: no loss, no duplication.
    let after = read_partition(&store, &key).await.unwrap();
    assert_eq!(after.len(), 3);
    let mut messages: Vec<String> = after.into_iter().filter_map(|e| e.message).collect();
    messages.sort();
    assert_eq!(messages, vec!["round 0", "round 1", "round 2"]);
}

#[tokio::test]
async fn test_event_types_partition_separately() {
    let ctx = TestContext::new();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let issues = IssueStore::open_in_memory().unwrap();
    let writer = PartitionWriter::new(store.clone(), BufferConfig::default());

    ctx.ingest(array_payload(vec![
        crash_event(),
        error_event("SIGILL"),
        log_event("warning noise"),
    ]))
    .await
    .assert_status_ok();

    let captured = ctx.captured_events();
    drain_to_stores(captured.clone(), &issues, &writer).await;

    for event in &captured {
        let key = PartitionKey::from_event(event);
        let records = read_partition(&store, &key).await.unwrap();
        assert_eq!(records.len(), 1, "partition {} should hold exactly its event", key);
        assert_eq!(records[0].event_type, event.event_type);
    }
}
