//! Worker scheduler for background tasks.

use std::sync::Arc;
use std::time::Duration;

use object_store::ObjectStore;
use tokio::time::interval;
use tracing::{error, info};

use event_queue::Consumer;
use event_store::{CompactionConfig, PartitionWriter};
use metadata_store::IssueStore;

use crate::compact::CompactionWorker;
use crate::ingest::IngestWorker;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Compaction pass interval
    pub compaction_interval: Duration,
    /// Metrics snapshot log interval
    pub metrics_log_interval: Duration,
    /// Compaction engine settings
    pub compaction: CompactionConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            compaction_interval: Duration::from_secs(3600), // 1 hour
            metrics_log_interval: Duration::from_secs(60),  // 1 minute
            compaction: CompactionConfig::default(),
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    writer: Arc<PartitionWriter>,
    issues: Arc<IssueStore>,
    consumer: Option<Arc<Consumer>>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        writer: Arc<PartitionWriter>,
        issues: Arc<IssueStore>,
    ) -> Self {
        Self {
            config,
            store,
            writer,
            issues,
            consumer: None,
        }
    }

    /// Creates a scheduler with a consumer for the full ingest pipeline.
    pub fn with_consumer(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        writer: Arc<PartitionWriter>,
        issues: Arc<IssueStore>,
        consumer: Arc<Consumer>,
    ) -> Self {
        Self {
            config,
            store,
            writer,
            issues,
            consumer: Some(consumer),
        }
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        // Ingest worker (queue -> issues + partition blocks)
        if let Some(ref consumer) = self.consumer {
            let consumer = consumer.clone();
            let issues = self.issues.clone();
            let writer = self.writer.clone();
            handles.push(tokio::spawn(async move {
                let worker = IngestWorker::new(consumer, issues, writer);
                if let Err(e) = worker.run().await {
                    error!("Ingest worker fatal error: {}", e);
                }
            }));
            info!("Ingest worker started");
        }

        // Compaction worker
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_compaction_worker().await;
        }));

        // Metrics snapshot worker
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        info!("Background workers started");
        handles
    }

    async fn run_compaction_worker(&self) {
        let worker = CompactionWorker::new(self.store.clone(), self.config.compaction.clone());
        let mut ticker = interval(self.config.compaction_interval);

        loop {
            ticker.tick().await;

            if let Err(e) = worker.run().await {
                error!("Compaction worker error: {}", e);
            }
        }
    }

    async fn run_metrics_log(&self) {
        use telemetry::metrics;

        let mut ticker = interval(self.config.metrics_log_interval);

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                events_received = snapshot.events_received,
                events_accepted = snapshot.events_accepted,
                events_rejected = snapshot.events_rejected,
                events_consumed = snapshot.events_consumed,
                issues_created = snapshot.issues_created,
                issues_bumped = snapshot.issues_bumped,
                blocks_written = snapshot.blocks_written,
                events_stored = snapshot.events_stored,
                buffered_events = snapshot.buffered_events,
                ingest_latency_mean_ms = snapshot.ingest_latency_mean_ms,
                flush_latency_mean_ms = snapshot.flush_latency_mean_ms,
                "Pipeline metrics snapshot"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.compaction_interval, Duration::from_secs(3600));
        assert_eq!(config.metrics_log_interval, Duration::from_secs(60));
        assert_eq!(config.compaction.min_files, 2);
    }
}
