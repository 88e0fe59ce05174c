//! Event store errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Errors from the columnar event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt block {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("buffer full: {message}")]
    BufferOverflow { message: String },

    #[error("flush failed for partition {partition} after {attempts} attempts")]
    FlushExhausted { partition: String, attempts: u32 },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<EventStoreError> for pipeline_core::Error {
    fn from(e: EventStoreError) -> Self {
        pipeline_core::Error::storage(
            pipeline_core::StoreErrorCode::EventStoreFailed,
            e.to_string(),
        )
    }
}
