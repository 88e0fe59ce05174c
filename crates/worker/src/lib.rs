//! Background workers for the telemetry pipeline.
//!
//! - Ingest (queue -> fingerprint -> issue bump -> partition writer)
//! - Compaction (periodic block merging)
//! - Metrics snapshot logging

pub mod compact;
pub mod ingest;
pub mod scheduler;

pub use compact::CompactionWorker;
pub use ingest::{IngestWorker, IngestWorkerConfig};
pub use scheduler::{WorkerConfig, WorkerScheduler};
