//! Partition writer: buffering and durable flush.
//!
//! Events accumulate in per-partition batches; a batch flushes when it
//! reaches the configured size, when the background task ticks, or on
//! shutdown. Each flush writes exactly one block per partition. A flush
//! never drops records: failed writes are retried with exponential
//! backoff, and exhausted retries restore the records to the buffer so a
//! later flush (or redelivery after a crash) picks them up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use object_store::ObjectStore;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use pipeline_core::EventRecord;
use telemetry::metrics;

use crate::block::encode_block;
use crate::config::BufferConfig;
use crate::error::{EventStoreError, Result};
use crate::layout::PartitionKey;

/// Calculate exponential backoff delay for retry attempts.
fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt);
    initial
        .saturating_mul(multiplier.min(u32::MAX as u64) as u32)
        .min(max)
}

/// Handle for controlling the background flush task.
pub struct FlushHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl FlushHandle {
    /// Signal the background task to stop and wait for its final flush.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join_handle.await;
    }

    /// Abort the background task immediately without flushing.
    pub fn abort(self) {
        self.join_handle.abort();
    }
}

/// Buffers events per partition and flushes them as columnar blocks.
pub struct PartitionWriter {
    store: Arc<dyn ObjectStore>,
    buffers: Mutex<HashMap<PartitionKey, Vec<EventRecord>>>,
    buffered: AtomicUsize,
    config: BufferConfig,
}

impl PartitionWriter {
    pub fn new(store: Arc<dyn ObjectStore>, config: BufferConfig) -> Self {
        Self {
            store,
            buffers: Mutex::new(HashMap::new()),
            buffered: AtomicUsize::new(0),
            config,
        }
    }

    /// Buffer one event, flushing its partition if the batch threshold
    /// is reached.
    ///
    /// Returns `BufferOverflow` when the writer-wide cap is hit; the
    /// caller should stop consuming until a flush drains the buffer.
    pub async fn write(&self, event: EventRecord) -> Result<()> {
        let total = self.buffered.load(Ordering::SeqCst);
        if total >= self.config.max_buffered_events {
            return Err(EventStoreError::BufferOverflow {
                message: format!(
                    "{} events buffered, cap is {}",
                    total, self.config.max_buffered_events
                ),
            });
        }

        let key = PartitionKey::from_event(&event);
        let batch_full = {
            let mut buffers = self.buffers.lock();
            let batch = buffers.entry(key.clone()).or_default();
            batch.push(event);
            self.buffered.fetch_add(1, Ordering::SeqCst);
            batch.len() >= self.config.max_batch_events
        };

        if batch_full {
            self.flush_partition(&key).await?;
        }

        Ok(())
    }

    /// Flush every buffered partition, one block per partition.
    ///
    /// Partitions flush independently: one partition exhausting its
    /// retries does not block the others, and its records stay buffered.
    pub async fn flush(&self) -> Result<()> {
        let keys: Vec<PartitionKey> = {
            let buffers = self.buffers.lock();
            buffers.keys().cloned().collect()
        };

        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.flush_partition(&key).await {
                tracing::error!(partition = %key, error = %e, "Partition flush failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Flush a single partition's batch to one new block.
    pub async fn flush_partition(&self, key: &PartitionKey) -> Result<()> {
        let records = {
            let mut buffers = self.buffers.lock();
            match buffers.remove(key) {
                Some(records) if !records.is_empty() => records,
                _ => return Ok(()),
            }
        };
        self.buffered.fetch_sub(records.len(), Ordering::SeqCst);

        match self.write_block_with_retry(key, &records).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Restore so nothing is dropped; the next flush retries.
                let count = records.len();
                {
                    let mut buffers = self.buffers.lock();
                    let batch = buffers.entry(key.clone()).or_default();
                    let mut restored = records;
                    restored.append(batch);
                    *batch = restored;
                }
                self.buffered.fetch_add(count, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn write_block_with_retry(
        &self,
        key: &PartitionKey,
        records: &[EventRecord],
    ) -> Result<()> {
        let initial = Duration::from_millis(self.config.flush_initial_delay_ms);
        let max_delay = Duration::from_millis(self.config.flush_max_delay_ms);
        let max_retries = self.config.flush_max_retries;

        let start = std::time::Instant::now();

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1, initial, max_delay);
                tracing::warn!(
                    partition = %key,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying block write"
                );
                tokio::time::sleep(delay).await;
            }

            let bytes = match encode_block(records) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(partition = %key, error = %e, "Block encode failed");
                    metrics().block_write_errors.inc();
                    continue;
                }
            };

            // Fresh name per attempt: a timed-out put may still have
            // landed, and overwriting a visible block is never allowed.
            let path = key.block_path(&PartitionKey::new_block_name());

            match self.store.put(&path, bytes.into()).await {
                Ok(_) => {
                    metrics().blocks_written.inc();
                    metrics().events_stored.inc_by(records.len() as u64);
                    metrics()
                        .flush_latency_ms
                        .observe(start.elapsed().as_millis() as u64);
                    tracing::debug!(
                        partition = %key,
                        path = %path,
                        events = records.len(),
                        "Flushed block"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(partition = %key, error = %e, "Block write failed");
                    metrics().block_write_errors.inc();
                }
            }
        }

        Err(EventStoreError::FlushExhausted {
            partition: key.to_string(),
            attempts: max_retries + 1,
        })
    }

    /// Current number of buffered events across all partitions.
    pub fn buffered_events(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.config.flush_interval_secs)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}

/// Start the periodic flush task for a writer.
///
/// The task ticks on the configured interval and performs one final
/// flush when the shutdown signal fires.
pub fn start_background_flush(writer: Arc<PartitionWriter>) -> FlushHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let interval = writer.flush_interval();

    let join_handle = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Starting background flush task");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if writer.buffered_events() > 0 {
                        if let Err(e) = writer.flush().await {
                            tracing::error!(error = %e, "Background flush failed");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("Shutdown signal received, performing final flush");
                    if writer.buffered_events() > 0 {
                        if let Err(e) = writer.flush().await {
                            tracing::error!(error = %e, "Final flush failed");
                        }
                    }
                    break;
                }
            }
        }

        tracing::info!("Background flush task stopped");
    });

    FlushHandle {
        shutdown_tx: Some(shutdown_tx),
        join_handle,
    }
}
