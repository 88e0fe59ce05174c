//! Queue configuration.

use serde::{Deserialize, Serialize};

/// Queue transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Topic normalized events are published to
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// SASL username (for managed clusters)
    pub sasl_username: Option<String>,
    /// SASL password (for managed clusters)
    pub sasl_password: Option<String>,
    /// Consumer settings
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_topic() -> String {
    "telemetry_events".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: default_topic(),
            compression: default_compression(),
            sasl_username: None,
            sasl_password: None,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }
}

/// Consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Topic to consume (defaults to the producer topic)
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Events fetched per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fetch timeout in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_group_id() -> String {
    "watchtower-ingest".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            topic: default_topic(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}
