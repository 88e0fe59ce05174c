//! Partitioned columnar event store.
//!
//! Events land as immutable Parquet blocks under Hive-style partition
//! prefixes (`organization_id=…/project_id=…/event_type=…/dt=…/`). The
//! [`writer::PartitionWriter`] buffers and flushes ingest batches; the
//! [`compaction`] engine merges the resulting small blocks into
//! size-bounded ones. Both speak to storage only through the
//! `object_store` primitives (put, list, get, rename, delete), so local
//! disk and S3-compatible backends are interchangeable.

pub mod block;
pub mod compaction;
pub mod config;
pub mod error;
pub mod layout;
pub mod store;
pub mod writer;

pub use config::{BufferConfig, CompactionConfig, StorageConfig};
pub use error::{EventStoreError, Result};
pub use layout::PartitionKey;
pub use store::create_object_store;
pub use writer::{start_background_flush, FlushHandle, PartitionWriter};
