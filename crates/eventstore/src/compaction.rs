//! Partition compaction.
//!
//! Ingest flushes produce many small blocks per partition; compaction
//! merges them into size-bounded ones. The engine works from a snapshot
//! of the file listing taken at scan time: blocks that appear afterwards
//! (a writer flushing mid-compaction) are left untouched for a future
//! run. Source blocks are deleted only after every replacement block has
//! been written, read back, verified, and renamed into place, so readers
//! never observe a partial replacement.
//!
//! Failures are isolated per partition: one corrupt block poisons its
//! partition's result entry, not the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use pipeline_core::{EventRecord, EventType};
use telemetry::metrics;

use crate::block::{decode_block, encode_block};
use crate::config::CompactionConfig;
use crate::error::{EventStoreError, Result};
use crate::layout::{is_tmp_block, PartitionKey};

/// Candidate selection filters. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct CompactionFilters {
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub event_type: Option<EventType>,
    pub date: Option<NaiveDate>,
}

impl CompactionFilters {
    pub fn matches(&self, key: &PartitionKey) -> bool {
        if let Some(org) = &self.organization_id {
            if org != &key.organization_id {
                return false;
            }
        }
        if let Some(project) = &self.project_id {
            if project != &key.project_id {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event_type != key.event_type {
                return false;
            }
        }
        if let Some(date) = self.date {
            if date != key.date {
                return false;
            }
        }
        true
    }
}

/// One block file in a candidate snapshot.
#[derive(Debug, Clone)]
pub struct BlockFile {
    pub path: Path,
    pub size: u64,
}

/// A partition selected for compaction, with its file-list snapshot.
#[derive(Debug, Clone)]
pub struct CandidatePartition {
    pub key: PartitionKey,
    pub files: Vec<BlockFile>,
}

impl CandidatePartition {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Outcome for one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionOutcome {
    pub partition: String,
    pub files_merged: usize,
    pub blocks_created: usize,
    pub events: u64,
    pub error: Option<String>,
}

/// Aggregate result of a compaction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionSummary {
    pub partitions_found: usize,
    pub partitions_compacted: usize,
    pub blocks_created: usize,
    pub files_removed: usize,
    pub total_events: u64,
    pub errors: usize,
    pub results: Vec<PartitionOutcome>,
}

impl CompactionSummary {
    /// The run succeeded only if zero partitions errored.
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    fn absorb(&mut self, outcome: PartitionOutcome) {
        if outcome.error.is_some() {
            self.errors += 1;
        } else if outcome.files_merged > 0 {
            self.partitions_compacted += 1;
            self.blocks_created += outcome.blocks_created;
            self.files_removed += outcome.files_merged;
            self.total_events += outcome.events;
        }
        self.results.push(outcome);
    }
}

/// Scan the store and select partitions worth compacting.
///
/// This is the single source of candidate-selection truth: the real run
/// and dry-run both call it, so they can never diverge.
pub async fn find_candidates(
    store: &Arc<dyn ObjectStore>,
    filters: &CompactionFilters,
    config: &CompactionConfig,
) -> Result<Vec<CandidatePartition>> {
    let listing: Vec<object_store::ObjectMeta> = store.list(None).try_collect().await?;

    let mut grouped: BTreeMap<String, CandidatePartition> = BTreeMap::new();

    for meta in listing {
        let Some((key, file_name)) = PartitionKey::parse_block_path(&meta.location) else {
            continue;
        };
        // Leftover temporaries from a crashed compaction are not data.
        if is_tmp_block(&file_name) {
            continue;
        }
        if !filters.matches(&key) {
            continue;
        }

        let entry = grouped
            .entry(key.prefix().to_string())
            .or_insert_with(|| CandidatePartition {
                key,
                files: Vec::new(),
            });
        entry.files.push(BlockFile {
            path: meta.location,
            size: meta.size as u64,
        });
    }

    let mut candidates: Vec<CandidatePartition> = grouped
        .into_values()
        .filter(|c| c.files.len() >= config.min_files)
        .collect();

    for candidate in &mut candidates {
        candidate
            .files
            .sort_by(|a, b| a.path.as_ref().cmp(b.path.as_ref()));
    }

    Ok(candidates)
}

/// Compact every matching partition.
///
/// With `dry_run` set, candidates are enumerated and reported but
/// nothing is read, written, or deleted.
pub async fn compact(
    store: &Arc<dyn ObjectStore>,
    filters: &CompactionFilters,
    config: &CompactionConfig,
    dry_run: bool,
) -> Result<CompactionSummary> {
    let candidates = find_candidates(store, filters, config).await?;

    let mut summary = CompactionSummary {
        partitions_found: candidates.len(),
        ..CompactionSummary::default()
    };

    for candidate in candidates {
        if dry_run {
            tracing::info!(
                partition = %candidate.key,
                files = candidate.files.len(),
                bytes = candidate.total_bytes(),
                "Would compact partition"
            );
            summary.results.push(PartitionOutcome {
                partition: candidate.key.to_string(),
                files_merged: candidate.files.len(),
                blocks_created: 0,
                events: 0,
                error: None,
            });
            continue;
        }

        let outcome = compact_partition(store, &candidate, config).await;
        summary.absorb(outcome);
    }

    metrics().compaction_runs.inc();
    if summary.errors > 0 {
        metrics().compaction_errors.inc_by(summary.errors as u64);
    }

    Ok(summary)
}

/// Compact a single partition from a pre-taken snapshot.
///
/// Every step before the final deletes is recoverable: on error the
/// newly written blocks are removed and the source files are left
/// exactly as found.
pub async fn compact_partition(
    store: &Arc<dyn ObjectStore>,
    candidate: &CandidatePartition,
    config: &CompactionConfig,
) -> PartitionOutcome {
    let partition = candidate.key.to_string();

    match merge_and_publish(store, candidate, config).await {
        Ok((blocks_created, events)) => {
            tracing::info!(
                partition = %partition,
                files_merged = candidate.files.len(),
                blocks_created = blocks_created,
                events = events,
                "Compacted partition"
            );
            PartitionOutcome {
                partition,
                files_merged: candidate.files.len(),
                blocks_created,
                events,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!(partition = %partition, error = %e, "Partition compaction failed");
            PartitionOutcome {
                partition,
                files_merged: 0,
                blocks_created: 0,
                events: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn merge_and_publish(
    store: &Arc<dyn ObjectStore>,
    candidate: &CandidatePartition,
    config: &CompactionConfig,
) -> Result<(usize, u64)> {
    // Read and decode the full snapshot in stable (name-sorted) order.
    let mut records: Vec<EventRecord> = Vec::new();
    for file in &candidate.files {
        let data = store.get(&file.path).await?.bytes().await?;
        let decoded = decode_block(data).map_err(|e| EventStoreError::Corrupt {
            path: file.path.to_string(),
            reason: e.to_string(),
        })?;
        records.extend(decoded);
    }

    let total_events = records.len() as u64;

    // Bound output size: split evenly into however many blocks the
    // source bytes require. Encoded output is never larger than the sum
    // of its compressed inputs by enough to matter here.
    let total_bytes = candidate.total_bytes();
    let block_count = total_bytes.div_ceil(config.max_block_bytes).max(1) as usize;
    let chunk_size = records.len().div_ceil(block_count).max(1);

    let mut published: Vec<Path> = Vec::new();
    let mut written: Vec<Path> = Vec::new();

    let publish_result: Result<()> = async {
        for chunk in records.chunks(chunk_size) {
            let bytes = encode_block(chunk)?;

            let name = PartitionKey::new_block_name();
            let tmp_path = candidate.key.tmp_block_path(&name);
            let final_path = candidate.key.block_path(&name);

            store.put(&tmp_path, bytes.into()).await?;
            written.push(tmp_path.clone());

            // Verify the replacement is readable before it becomes data.
            let readback = store.get(&tmp_path).await?.bytes().await?;
            let verified = decode_block(readback).map_err(|e| EventStoreError::Corrupt {
                path: tmp_path.to_string(),
                reason: format!("verification failed: {}", e),
            })?;
            if verified.len() != chunk.len() {
                return Err(EventStoreError::Corrupt {
                    path: tmp_path.to_string(),
                    reason: format!(
                        "verification count mismatch: wrote {}, read {}",
                        chunk.len(),
                        verified.len()
                    ),
                });
            }

            store.rename(&tmp_path, &final_path).await?;
            written.pop();
            written.push(final_path.clone());
            published.push(final_path);
        }
        Ok(())
    }
    .await;

    if let Err(e) = publish_result {
        // Roll back our own output; the sources were never touched.
        for path in &written {
            if let Err(cleanup) = store.delete(path).await {
                tracing::warn!(path = %path, error = %cleanup, "Failed to clean up compaction output");
            }
        }
        return Err(e);
    }

    // All replacements are durable and verified; only now do the
    // snapshot files go away. Files created after the snapshot are not
    // in `candidate.files` and survive untouched.
    for file in &candidate.files {
        store.delete(&file.path).await?;
    }

    Ok((published.len(), total_events))
}

/// Read every block in a partition, in name order.
///
/// Used by tests and the operational surface to inspect partitions.
pub async fn read_partition(
    store: &Arc<dyn ObjectStore>,
    key: &PartitionKey,
) -> Result<Vec<EventRecord>> {
    let prefix = key.prefix();
    let mut listing: Vec<object_store::ObjectMeta> =
        store.list(Some(&prefix)).try_collect().await?;
    listing.sort_by(|a, b| a.location.as_ref().cmp(b.location.as_ref()));

    let mut records = Vec::new();
    for meta in listing {
        let Some((_, file_name)) = PartitionKey::parse_block_path(&meta.location) else {
            continue;
        };
        if is_tmp_block(&file_name) {
            continue;
        }
        let data = store.get(&meta.location).await?.bytes().await?;
        records.extend(decode_block(data)?);
    }

    Ok(records)
}
