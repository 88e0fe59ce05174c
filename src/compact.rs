//! `watchtower-compact` - compaction command for the columnar store.
//!
//! Scans partitions for excess small blocks and merges them, printing a
//! per-partition outcome table and a final summary. Exits non-zero if
//! any partition errored.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use event_store::compaction::{compact, CompactionFilters, CompactionSummary};
use event_store::{create_object_store, CompactionConfig, StorageConfig};
use pipeline_core::EventType;
use telemetry::init_tracing_from_env;

#[derive(Debug, Parser)]
#[command(
    name = "watchtower-compact",
    about = "Merge small partition blocks in the event store"
)]
struct Args {
    /// Root directory of the local event store
    #[arg(long, default_value = "./data/events")]
    data_dir: PathBuf,

    /// Only compact partitions of this organization
    #[arg(long)]
    organization: Option<String>,

    /// Only compact partitions of this project
    #[arg(long)]
    project: Option<String>,

    /// Only compact partitions of this event type
    /// (crash, error, log, metric, span)
    #[arg(long)]
    event_type: Option<String>,

    /// Only compact partitions of this date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,

    /// Enumerate candidates without touching anything
    #[arg(long)]
    dry_run: bool,

    /// Maximum merged block size in megabytes
    #[arg(long, default_value_t = 50)]
    max_block_mb: u64,

    /// Minimum block count for a partition to be compacted
    #[arg(long, default_value_t = 2)]
    min_files: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing_from_env();

    match run(Args::parse()).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<CompactionSummary> {
    let filters = build_filters(&args)?;

    let config = CompactionConfig {
        max_block_bytes: args.max_block_mb * 1024 * 1024,
        min_files: args.min_files,
    };

    let storage = StorageConfig::Local {
        path: args.data_dir.clone(),
    };
    let store = create_object_store(&storage).context("Failed to open event store")?;

    let summary = compact(&store, &filters, &config, args.dry_run)
        .await
        .context("Compaction run failed")?;

    print_summary(&summary, args.dry_run);

    Ok(summary)
}

fn build_filters(args: &Args) -> Result<CompactionFilters> {
    let event_type = match &args.event_type {
        Some(s) => Some(
            EventType::parse(s)
                .with_context(|| format!("unknown event type: {} (expected crash, error, log, metric, or span)", s))?,
        ),
        None => None,
    };

    let date = match &args.date {
        Some(s) => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid date: {} (expected YYYY-MM-DD)", s))?,
        ),
        None => None,
    };

    Ok(CompactionFilters {
        organization_id: args.organization.clone(),
        project_id: args.project.clone(),
        event_type,
        date,
    })
}

fn print_summary(summary: &CompactionSummary, dry_run: bool) {
    if summary.results.is_empty() {
        println!("No partitions need compaction.");
        return;
    }

    let verb = if dry_run { "would merge" } else { "merged" };

    for result in &summary.results {
        match &result.error {
            Some(error) => {
                println!("ERROR  {}  {}", result.partition, error);
            }
            None if dry_run => {
                println!("PLAN   {}  {} {} files", result.partition, verb, result.files_merged);
            }
            None => {
                println!(
                    "OK     {}  {} {} files -> {} blocks ({} events)",
                    result.partition, verb, result.files_merged, result.blocks_created, result.events
                );
            }
        }
    }

    println!();
    println!(
        "partitions: {} found, {} compacted | blocks created: {} | files removed: {} | events: {} | errors: {}",
        summary.partitions_found,
        summary.partitions_compacted,
        summary.blocks_created,
        summary.files_removed,
        summary.total_events,
        summary.errors
    );
}
