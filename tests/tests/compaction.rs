//! Compaction engine scenario tests.

use std::sync::Arc;

use object_store::memory::InMemory;
use object_store::ObjectStore;

use event_store::block::encode_block;
use event_store::compaction::{compact, find_candidates, read_partition, CompactionFilters};
use event_store::{CompactionConfig, PartitionKey};
use pipeline_core::{EventRecord, EventType};
use worker::CompactionWorker;

fn event(message: &str) -> EventRecord {
    let mut event = EventRecord::new(EventType::Error, "org-test", "proj-test");
    event.message = Some(message.into());
    event.bundle_id = Some("com.example.app".into());
    event.received_at = "2024-03-15T10:00:00Z".parse().unwrap();
    event
}

async fn write_block(store: &Arc<dyn ObjectStore>, key: &PartitionKey, events: &[EventRecord]) {
    let bytes = encode_block(events).unwrap();
    let path = key.block_path(&PartitionKey::new_block_name());
    store.put(&path, bytes.into()).await.unwrap();
}

#[tokio::test]
async fn test_five_files_of_one_thousand_events() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let key = PartitionKey::from_event(&event("probe"));

    for batch in 0..5 {
        let events: Vec<EventRecord> = (0..1000)
            .map(|i| event(&format!("event {} in batch {}", i, batch)))
            .collect();
        write_block(&store, &key, &events).await;
    }

    // The 50MB default cap comfortably fits all 5,000 small events.
    let summary = compact(
        &store,
        &CompactionFilters::default(),
        &CompactionConfig::default(),
        false,
    )
    .await
    .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.blocks_created, 1);
    assert_eq!(summary.files_removed, 5);
    assert_eq!(summary.total_events, 5000);

    let records = read_partition(&store, &key).await.unwrap();
    assert_eq!(records.len(), 5000);
}

#[tokio::test]
async fn test_second_run_is_noop() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let key = PartitionKey::from_event(&event("probe"));

    for i in 0..4 {
        write_block(&store, &key, &[event(&format!("m{}", i))]).await;
    }

    let config = CompactionConfig::default();
    let first = compact(&store, &CompactionFilters::default(), &config, false)
        .await
        .unwrap();
    assert_eq!(first.partitions_compacted, 1);
    assert_eq!(first.files_removed, 4);

    let second = compact(&store, &CompactionFilters::default(), &config, false)
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.partitions_found, 0);
    assert_eq!(second.blocks_created, 0);
    assert_eq!(second.files_removed, 0);
}

#[tokio::test]
async fn test_dry_run_and_real_run_agree_on_candidates() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let config = CompactionConfig::default();

    let error_key = PartitionKey::from_event(&event("probe"));
    let mut log_probe = event("probe");
    log_probe.event_type = EventType::Log;
    let log_key = PartitionKey::from_event(&log_probe);

    for i in 0..3 {
        write_block(&store, &error_key, &[event(&format!("e{}", i))]).await;
    }
    // Single-block partition: not a candidate.
    write_block(&store, &log_key, &[log_probe.clone()]).await;

    let dry = compact(&store, &CompactionFilters::default(), &config, true)
        .await
        .unwrap();
    assert_eq!(dry.partitions_found, 1);
    assert_eq!(dry.partitions_compacted, 0);

    let real = compact(&store, &CompactionFilters::default(), &config, false)
        .await
        .unwrap();
    assert_eq!(real.partitions_found, dry.partitions_found);
    assert_eq!(real.results[0].partition, dry.results[0].partition);
    assert_eq!(real.partitions_compacted, 1);
}

#[tokio::test]
async fn test_date_filter_selects_one_partition() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let config = CompactionConfig::default();

    let day_one = event("d1");
    let mut day_two = event("d2");
    day_two.received_at = "2024-03-16T10:00:00Z".parse().unwrap();

    let key_one = PartitionKey::from_event(&day_one);
    let key_two = PartitionKey::from_event(&day_two);

    for _ in 0..2 {
        write_block(&store, &key_one, &[day_one.clone()]).await;
        write_block(&store, &key_two, &[day_two.clone()]).await;
    }

    let filters = CompactionFilters {
        date: Some("2024-03-16".parse().unwrap()),
        ..CompactionFilters::default()
    };
    let summary = compact(&store, &filters, &config, false).await.unwrap();

    assert_eq!(summary.partitions_compacted, 1);
    assert!(summary.results[0].partition.contains("dt=2024-03-16"));

    // The other day's blocks are untouched.
    let untouched = find_candidates(&store, &CompactionFilters::default(), &config)
        .await
        .unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0].key.date.to_string(), "2024-03-15");
}

#[tokio::test]
async fn test_partition_failure_does_not_block_others() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let config = CompactionConfig::default();

    let healthy = event("ok");
    let mut broken_probe = event("broken");
    broken_probe.project_id = "proj-broken".into();

    let healthy_key = PartitionKey::from_event(&healthy);
    let broken_key = PartitionKey::from_event(&broken_probe);

    for i in 0..2 {
        write_block(&store, &healthy_key, &[event(&format!("h{}", i))]).await;
    }
    write_block(&store, &broken_key, &[broken_probe.clone()]).await;
    store
        .put(
            &broken_key.block_path(&PartitionKey::new_block_name()),
            "definitely not parquet".into(),
        )
        .await
        .unwrap();

    let summary = compact(&store, &CompactionFilters::default(), &config, false)
        .await
        .unwrap();

    // Non-zero error count fails the run, but completed work stands.
    assert!(!summary.is_success());
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.partitions_compacted, 1);
    assert_eq!(read_partition(&store, &healthy_key).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_compaction_worker_logs_and_returns_summary() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let key = PartitionKey::from_event(&event("probe"));

    for i in 0..3 {
        write_block(&store, &key, &[event(&format!("w{}", i))]).await;
    }

    let worker = CompactionWorker::new(store.clone(), CompactionConfig::default());
    let summary = worker.run().await.unwrap();

    assert_eq!(summary.partitions_compacted, 1);
    assert_eq!(read_partition(&store, &key).await.unwrap().len(), 3);
}
