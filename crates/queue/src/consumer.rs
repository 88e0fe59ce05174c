//! Queue consumer for the ingest pipeline.
//!
//! Uses rskafka with:
//! - Manual offset management for at-least-once delivery
//! - Batch fetching with configurable size and timeout
//! - JSON deserialization of EventRecord payloads

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use rskafka::client::{
    partition::{OffsetAt, UnknownTopicHandling},
    ClientBuilder, Credentials, SaslConfig,
};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use pipeline_core::{EventRecord, Result};
use telemetry::metrics;

use crate::config::ConsumerConfig;

/// Creates a TLS configuration for managed clusters.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Offset tracking for manual commit.
#[derive(Debug, Clone, Copy)]
pub struct Offset {
    pub partition: i32,
    pub offset: i64,
}

/// Consumer reading normalized events from the queue.
pub struct Consumer {
    config: ConsumerConfig,
    brokers: Vec<String>,
    sasl_username: Option<String>,
    sasl_password: Option<String>,
    /// Partition client (currently only partition 0)
    partition_client: RwLock<Option<Arc<rskafka::client::partition::PartitionClient>>>,
    /// Next offset to read
    current_offset: AtomicI64,
    initialized: AtomicBool,
}

impl Consumer {
    /// Creates a new consumer.
    pub fn new(
        config: ConsumerConfig,
        brokers: Vec<String>,
        sasl_username: Option<String>,
        sasl_password: Option<String>,
    ) -> Self {
        info!(
            group_id = %config.group_id,
            topic = %config.topic,
            batch_size = config.batch_size,
            "Creating queue consumer"
        );

        Self {
            config,
            brokers,
            sasl_username,
            sasl_password,
            partition_client: RwLock::new(None),
            current_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Initializes the consumer connection.
    async fn ensure_connected(&self) -> Result<Arc<rskafka::client::partition::PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let connection = self.brokers.join(",");
        let mut builder = ClientBuilder::new(vec![connection]);

        if let (Some(username), Some(password)) = (&self.sasl_username, &self.sasl_password) {
            builder = builder
                .tls_config(create_tls_config())
                .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                    username.clone(),
                    password.clone(),
                )));
        }

        let client = builder.build().await.map_err(|e| {
            pipeline_core::Error::internal(format!("Failed to connect to queue: {}", e))
        })?;

        let partition_client = client
            .partition_client(self.config.topic.clone(), 0, UnknownTopicHandling::Error)
            .await
            .map_err(|e| {
                pipeline_core::Error::internal(format!("Failed to get partition client: {}", e))
            })?;

        let partition_client = Arc::new(partition_client);

        if !self.initialized.load(Ordering::SeqCst) {
            let offset = partition_client
                .get_offset(OffsetAt::Latest)
                .await
                .map_err(|e| {
                    pipeline_core::Error::internal(format!("Failed to get offset: {}", e))
                })?;

            self.current_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(
                topic = %self.config.topic,
                partition = 0,
                offset = offset,
                "Consumer initialized at offset"
            );
        }

        {
            let mut client_guard = self.partition_client.write().await;
            *client_guard = Some(partition_client.clone());
        }

        Ok(partition_client)
    }

    /// Fetches a batch of events from the queue.
    ///
    /// Returns the events and the offset to commit after processing.
    pub async fn fetch_batch(&self) -> Result<(Vec<EventRecord>, Option<Offset>)> {
        let client = self.ensure_connected().await?;

        let max_bytes = self.config.batch_size * 64 * 1024;
        let current = self.current_offset.load(Ordering::SeqCst);

        let (records, _watermark) = client
            .fetch_records(
                current,
                1..max_bytes as i32,
                self.config.batch_timeout_ms as i32,
            )
            .await
            .map_err(|e| {
                error!("Fetch error: {}", e);
                pipeline_core::Error::internal(format!("Failed to fetch records: {}", e))
            })?;

        if records.is_empty() {
            return Ok((Vec::new(), None));
        }

        let mut events = Vec::with_capacity(records.len());
        let mut max_offset = current;

        for record in records {
            max_offset = record.offset.max(max_offset);

            if let Some(value) = record.record.value {
                match serde_json::from_slice::<EventRecord>(&value) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(
                            offset = record.offset,
                            error = %e,
                            "Failed to deserialize event, skipping"
                        );
                    }
                }
            }
        }

        metrics().events_consumed.inc_by(events.len() as u64);

        Ok((
            events,
            Some(Offset {
                partition: 0,
                offset: max_offset + 1,
            }),
        ))
    }

    /// Commits an offset: subsequent fetches begin there.
    pub async fn commit(&self, offset: Offset) -> Result<()> {
        self.current_offset.store(offset.offset, Ordering::SeqCst);
        Ok(())
    }

    /// Clears the cached connection so the next fetch reconnects.
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
    }
}
