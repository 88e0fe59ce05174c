//! Periodic compaction worker.

use std::sync::Arc;

use object_store::ObjectStore;
use tracing::{info, warn};

use event_store::compaction::{compact, CompactionFilters, CompactionSummary};
use event_store::CompactionConfig;

/// Worker that merges small partition blocks on a schedule.
pub struct CompactionWorker {
    store: Arc<dyn ObjectStore>,
    config: CompactionConfig,
}

impl CompactionWorker {
    pub fn new(store: Arc<dyn ObjectStore>, config: CompactionConfig) -> Self {
        Self { store, config }
    }

    /// Run one unfiltered compaction pass over the whole store.
    pub async fn run(&self) -> Result<CompactionSummary, String> {
        info!("Running compaction worker");

        let summary = compact(&self.store, &CompactionFilters::default(), &self.config, false)
            .await
            .map_err(|e| e.to_string())?;

        if summary.partitions_found == 0 {
            info!("No partitions need compaction");
        } else {
            info!(
                partitions_found = summary.partitions_found,
                partitions_compacted = summary.partitions_compacted,
                blocks_created = summary.blocks_created,
                files_removed = summary.files_removed,
                total_events = summary.total_events,
                errors = summary.errors,
                "Compaction pass complete"
            );
        }

        for result in &summary.results {
            if let Some(error) = &result.error {
                warn!(partition = %result.partition, error = %error, "Partition failed to compact");
            }
        }

        Ok(summary)
    }
}
