//! Internal telemetry for the Watchtower pipeline.
//!
//! Metrics stay in-process: an atomic registry that the worker scheduler
//! snapshots and logs periodically. No external metrics system.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
