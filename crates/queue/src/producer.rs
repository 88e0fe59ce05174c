//! Queue producer using rskafka.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::{
    partition::{Compression, UnknownTopicHandling},
    ClientBuilder, Credentials, SaslConfig,
};
use rskafka::record::Record;
use tokio::sync::RwLock;
use tracing::{debug, error};

use pipeline_core::{EventRecord, Result};
use telemetry::metrics;

use crate::config::QueueConfig;

/// Result of publishing events.
#[derive(Debug)]
pub struct SendResult {
    pub events_sent: usize,
    pub errors: Vec<String>,
}

/// Publisher seam for the ingest API.
///
/// The real implementation talks to the queue; tests capture events in
/// memory.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a batch of normalized events.
    async fn publish_events(&self, events: Vec<EventRecord>) -> Result<SendResult>;

    /// Whether the publisher believes it can reach the queue.
    fn is_healthy(&self) -> bool;
}

/// Creates a TLS configuration for managed clusters.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Queue producer publishing normalized event records as JSON.
pub struct Producer {
    config: QueueConfig,
    /// Cached partition client (partition 0)
    client: RwLock<Option<Arc<rskafka::client::partition::PartitionClient>>>,
}

impl Producer {
    /// Creates a new producer.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Gets or creates the partition client.
    async fn get_client(&self) -> Result<Arc<rskafka::client::partition::PartitionClient>> {
        {
            let client = self.client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let connection = self.config.broker_string();
        let mut builder = ClientBuilder::new(vec![connection]);

        if let (Some(username), Some(password)) =
            (&self.config.sasl_username, &self.config.sasl_password)
        {
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

        {
            let mut client = self.client.write().await;
            *client = Some(partition_client.clone());
        }

        Ok(partition_client)
    }

    fn compression(&self) -> Compression {
        match self.config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }
}

#[async_trait]
impl EventPublisher for Producer {
    async fn publish_events(&self, events: Vec<EventRecord>) -> Result<SendResult> {
        if events.is_empty() {
            return Ok(SendResult {
                events_sent: 0,
                errors: Vec::new(),
            });
        }

        let start = std::time::Instant::now();
        let client = self.get_client().await?;

        let mut records = Vec::with_capacity(events.len());
        let mut errors = Vec::new();

        for event in events {
            // Key by scope so one project's events stay together.
            let key = format!("{}:{}", event.organization_id, event.project_id);

            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    records.push(Record {
                        key: Some(key.into_bytes()),
                        value: Some(payload),
                        headers: BTreeMap::new(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    errors.push(format!("Failed to serialize event: {}", e));
                }
            }
        }

        if records.is_empty() {
            return Ok(SendResult {
                events_sent: 0,
                errors,
            });
        }

        match client.produce(records.clone(), self.compression()).await {
            Ok(_offsets) => {
                let sent = records.len();
                metrics().events_published.inc_by(sent as u64);

                let elapsed = start.elapsed();
                metrics()
                    .publish_latency_ms
                    .observe(elapsed.as_millis() as u64);

                debug!(
                    topic = %self.config.topic,
                    count = sent,
                    latency_ms = elapsed.as_millis() as u64,
                    "Published events to queue"
                );

                Ok(SendResult {
                    events_sent: sent,
                    errors,
                })
            }
            Err(e) => {
                error!("Failed to publish events to queue: {}", e);
                metrics().publish_errors.inc_by(records.len() as u64);
                errors.push(format!("Failed to produce: {}", e));
                Ok(SendResult {
                    events_sent: 0,
                    errors,
                })
            }
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
