//! Event store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage backend selection.
///
/// The core only ever uses the object-store primitives, so the backend
/// is purely a deployment concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem rooted at `path`.
    Local { path: PathBuf },
    /// In-memory store (tests, ephemeral deployments).
    Memory,
    /// S3-compatible object store.
    #[cfg(feature = "s3")]
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        #[serde(default)]
        allow_http: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("./data/events"),
        }
    }
}

/// Partition writer buffering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Per-partition batch size that triggers a flush of that partition.
    #[serde(default = "default_max_batch_events")]
    pub max_batch_events: usize,
    /// Total buffered events across all partitions before backpressure.
    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
    /// Background flush interval in seconds.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Maximum flush retries before records are restored to the buffer.
    #[serde(default = "default_flush_max_retries")]
    pub flush_max_retries: u32,
    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_flush_initial_delay_ms")]
    pub flush_initial_delay_ms: u64,
    /// Retry backoff cap in milliseconds.
    #[serde(default = "default_flush_max_delay_ms")]
    pub flush_max_delay_ms: u64,
}

fn default_max_batch_events() -> usize {
    500
}

fn default_max_buffered_events() -> usize {
    50_000
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_flush_max_retries() -> u32 {
    3
}

fn default_flush_initial_delay_ms() -> u64 {
    100
}

fn default_flush_max_delay_ms() -> u64 {
    5_000
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_batch_events: default_max_batch_events(),
            max_buffered_events: default_max_buffered_events(),
            flush_interval_secs: default_flush_interval_secs(),
            flush_max_retries: default_flush_max_retries(),
            flush_initial_delay_ms: default_flush_initial_delay_ms(),
            flush_max_delay_ms: default_flush_max_delay_ms(),
        }
    }
}

/// Compaction engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Maximum size of a merged output block in bytes. Partitions whose
    /// contents exceed this split into multiple output blocks.
    #[serde(default = "default_max_block_bytes")]
    pub max_block_bytes: u64,
    /// Minimum block count for a partition to be a compaction candidate.
    #[serde(default = "default_min_files")]
    pub min_files: usize,
}

fn default_max_block_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_min_files() -> usize {
    2
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: default_max_block_bytes(),
            min_files: default_min_files(),
        }
    }
}
