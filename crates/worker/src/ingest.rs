//! Ingest worker: the core data pipeline.
//!
//! 1. Fetch a batch of normalized events from the queue
//! 2. Per event: fingerprint -> issue find-or-create-and-bump -> buffer
//!    into the partition writer
//! 3. Flush the writer so buffered records are durable
//! 4. Commit the offset (at-least-once delivery)
//!
//! Redelivery semantics: a crash between step 3 and step 4 redelivers
//! the batch, which may double-increment occurrence counts and duplicate
//! records into a fresh block. That is the accepted at-least-once
//! contract; state is never corrupted, only over-counted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use event_queue::Consumer;
use event_store::PartitionWriter;
use metadata_store::IssueStore;
use pipeline_core::{fingerprint, EventRecord, Result};
use telemetry::metrics;

/// Ingest worker configuration.
#[derive(Debug, Clone)]
pub struct IngestWorkerConfig {
    /// Maximum retries for retryable per-event store failures
    pub max_retries: u32,
    /// Backoff between retries
    pub retry_backoff: Duration,
    /// Whether to skip a batch that keeps failing (commit anyway)
    pub skip_on_failure: bool,
}

impl Default for IngestWorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            skip_on_failure: true,
        }
    }
}

/// Worker that drains the queue into issues and partition blocks.
pub struct IngestWorker {
    consumer: Arc<Consumer>,
    issues: Arc<IssueStore>,
    writer: Arc<PartitionWriter>,
    config: IngestWorkerConfig,
}

impl IngestWorker {
    pub fn new(
        consumer: Arc<Consumer>,
        issues: Arc<IssueStore>,
        writer: Arc<PartitionWriter>,
    ) -> Self {
        Self {
            consumer,
            issues,
            writer,
            config: IngestWorkerConfig::default(),
        }
    }

    pub fn with_config(
        consumer: Arc<Consumer>,
        issues: Arc<IssueStore>,
        writer: Arc<PartitionWriter>,
        config: IngestWorkerConfig,
    ) -> Self {
        Self {
            consumer,
            issues,
            writer,
            config,
        }
    }

    /// Main run loop - fetch, process, flush, commit.
    pub async fn run(&self) -> Result<()> {
        info!(
            topic = %self.consumer.config().topic,
            group_id = %self.consumer.config().group_id,
            batch_size = self.consumer.config().batch_size,
            "Ingest worker starting"
        );

        loop {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(count = count, "Processed batch");
                    }
                }
                Err(e) => {
                    error!("Batch processing error: {}", e);
                    metrics().consumer_errors.inc();
                    tokio::time::sleep(Duration::from_secs(1)).await;

                    // Reset connection on error
                    self.consumer.reset_connection().await;
                }
            }
        }
    }

    /// Processes a single batch end to end.
    pub async fn process_batch(&self) -> Result<usize> {
        let (events, offset) = self.consumer.fetch_batch().await?;

        if events.is_empty() {
            return Ok(0);
        }

        let count = events.len();
        let result = self.process_events(events).await;

        match result {
            Ok(processed) => {
                // Records are durable; acknowledging is now safe.
                if let Some(offset) = offset {
                    self.consumer.commit(offset).await?;
                }
                Ok(processed)
            }
            Err(e) => {
                error!(count = count, error = %e, "Failed to process batch after retries");

                if self.config.skip_on_failure {
                    // Skip this batch and commit anyway to avoid an
                    // infinite redelivery loop on a poison batch.
                    warn!("Skipping failed batch, committing offset");
                    if let Some(offset) = offset {
                        self.consumer.commit(offset).await?;
                    }
                    Ok(0)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Aggregate and buffer every event, then flush the writer.
    async fn process_events(&self, events: Vec<EventRecord>) -> Result<usize> {
        let mut processed = 0;

        for event in events {
            let start = std::time::Instant::now();

            self.aggregate_with_retry(&event).await?;

            self.writer
                .write(event)
                .await
                .map_err(pipeline_core::Error::from)?;

            metrics()
                .aggregate_latency_ms
                .observe(start.elapsed().as_millis() as u64);
            processed += 1;
        }

        metrics().buffered_events.set(self.writer.buffered_events() as u64);

        // Durable before the offset commit: the flush writes one block
        // per partition touched by this batch.
        self.writer
            .flush()
            .await
            .map_err(pipeline_core::Error::from)?;

        Ok(processed)
    }

    /// Bump the event's issue, retrying retryable store failures.
    async fn aggregate_with_retry(&self, event: &EventRecord) -> Result<()> {
        let print = fingerprint(event);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff * attempt;
                warn!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying issue aggregation"
                );
                tokio::time::sleep(backoff).await;
            }

            match self
                .issues
                .find_or_create_and_bump(&event.project_id, &print, event)
            {
                Ok(issue) => {
                    if issue.occurrence_count == 1 {
                        metrics().issues_created.inc();
                        debug!(
                            project_id = %event.project_id,
                            issue = %issue.public_id,
                            "Created issue"
                        );
                    } else {
                        metrics().issues_bumped.inc();
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    metrics().issue_store_errors.inc();
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| pipeline_core::Error::internal("aggregation failed without error")))
    }
}
