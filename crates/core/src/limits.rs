//! Size and age limits for the telemetry pipeline.
//!
//! MEMORY SAFETY: These limits prevent DoS via memory exhaustion from
//! oversized submissions. An event that trips a limit is rejected at the
//! boundary; a field that trips a per-field cap is truncated or dropped
//! by the normalizer without rejecting the event.

// === Batch Limits ===

/// Maximum batch payload size in bytes (1MB).
///
/// Prevents memory spikes from oversized requests.
pub const MAX_BATCH_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum events per batch.
pub const MAX_BATCH_EVENTS: usize = 1000;

/// Maximum single event size in bytes (64KB).
///
/// Crash events with deep stack traces and breadcrumb trails are the
/// largest payloads; real-world crashes stay well under this.
pub const MAX_EVENT_SIZE_BYTES: usize = 64 * 1024;

// === Field Limits ===

/// Message max length in characters.
pub const MAX_MESSAGE_LEN: usize = 8 * 1024;

/// Exception type max length.
pub const MAX_EXCEPTION_TYPE_LEN: usize = 256;

/// Stack frames kept per event.
pub const MAX_STACK_FRAMES: usize = 256;

/// Breadcrumbs kept per event.
pub const MAX_BREADCRUMBS: usize = 100;

/// Entries kept in each of the tags and context maps.
pub const MAX_MAP_ENTRIES: usize = 64;

/// Tag/context value max length.
pub const MAX_MAP_VALUE_LEN: usize = 1024;

// === Timestamp Bounds ===

/// Maximum allowed clock skew for future timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;

/// Maximum age for stale events (hours).
pub const MAX_EVENT_AGE_HOURS: i64 = 24;
