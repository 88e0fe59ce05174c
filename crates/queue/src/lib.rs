//! Queue transport for the telemetry pipeline.
//!
//! The queue itself is an external collaborator with at-least-once
//! delivery; this crate is the adapter. [`Producer`] publishes normalized
//! event records, [`Consumer`] fetches batches with manual offset
//! commits. The [`EventPublisher`] trait is the seam tests mock.

pub mod config;
pub mod consumer;
pub mod health;
pub mod producer;

pub use config::{ConsumerConfig, QueueConfig};
pub use consumer::{Consumer, Offset};
pub use producer::{EventPublisher, Producer, SendResult};
