//! Internal metrics collection.
//!
//! Counters and histograms for every pipeline stage, snapshotted and
//! logged by the worker scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingress metrics
    pub batches_received: Counter,
    pub events_received: Counter,
    pub events_accepted: Counter,
    pub events_rejected: Counter,

    // Queue metrics
    pub events_published: Counter,
    pub publish_errors: Counter,
    pub events_consumed: Counter,
    pub consumer_errors: Counter,

    // Issue aggregation metrics
    pub issues_created: Counter,
    pub issues_bumped: Counter,
    pub issue_store_errors: Counter,

    // Event store metrics
    pub blocks_written: Counter,
    pub events_stored: Counter,
    pub block_write_errors: Counter,

    // Compaction metrics
    pub compaction_runs: Counter,
    pub compaction_errors: Counter,

    // Latency histograms
    pub ingest_latency_ms: Histogram,
    pub publish_latency_ms: Histogram,
    pub flush_latency_ms: Histogram,
    pub aggregate_latency_ms: Histogram,

    // Gauges
    pub buffered_events: Gauge,
    pub consumer_lag: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub batches_received: u64,
    pub events_received: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
    pub events_published: u64,
    pub publish_errors: u64,
    pub events_consumed: u64,
    pub consumer_errors: u64,
    pub issues_created: u64,
    pub issues_bumped: u64,
    pub blocks_written: u64,
    pub events_stored: u64,
    pub block_write_errors: u64,
    pub compaction_runs: u64,
    pub compaction_errors: u64,
    pub ingest_latency_mean_ms: f64,
    pub flush_latency_mean_ms: f64,
    pub aggregate_latency_mean_ms: f64,
    pub buffered_events: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            batches_received: self.batches_received.get(),
            events_received: self.events_received.get(),
            events_accepted: self.events_accepted.get(),
            events_rejected: self.events_rejected.get(),
            events_published: self.events_published.get(),
            publish_errors: self.publish_errors.get(),
            events_consumed: self.events_consumed.get(),
            consumer_errors: self.consumer_errors.get(),
            issues_created: self.issues_created.get(),
            issues_bumped: self.issues_bumped.get(),
            blocks_written: self.blocks_written.get(),
            events_stored: self.events_stored.get(),
            block_write_errors: self.block_write_errors.get(),
            compaction_runs: self.compaction_runs.get(),
            compaction_errors: self.compaction_errors.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            flush_latency_mean_ms: self.flush_latency_ms.mean(),
            aggregate_latency_mean_ms: self.aggregate_latency_ms.mean(),
            buffered_events: self.buffered_events.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
