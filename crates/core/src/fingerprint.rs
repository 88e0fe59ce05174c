//! Deterministic grouping fingerprints.
//!
//! A fingerprint is a SHA-256 hex digest over an ordered list of
//! discriminating components chosen by event type. The component order is
//! fixed and never data-dependent; absent components participate as empty
//! strings so that "present but empty" and "absent" hash identically on
//! every code path.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::event::{EventRecord, EventType};

/// Stack frames considered when fingerprinting crashes and errors.
///
/// Bounds fingerprint sensitivity to deep or noisy traces: two crashes
/// that diverge only below the fifth frame still group together.
const STACK_FRAME_LIMIT: usize = 5;

/// Component delimiter: the ASCII unit separator, which never appears in
/// real exception names, symbols, or log text.
const DELIMITER: char = '\u{1f}';

/// Sentinel for crashes and errors with no exception type.
const UNKNOWN_EXCEPTION: &str = "unknown-exception";

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .unwrap()
    })
}

fn hex_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Strip volatile tokens from a log message so that messages differing
/// only in ids, addresses, or counts group together.
///
/// UUIDs are replaced before bare numbers so their hex runs do not get
/// shredded digit by digit.
pub fn strip_volatile_tokens(message: &str) -> String {
    let stripped = uuid_re().replace_all(message, "<uuid>");
    let stripped = hex_addr_re().replace_all(&stripped, "<addr>");
    number_re().replace_all(&stripped, "<num>").into_owned()
}

/// Compute the grouping fingerprint for an event.
///
/// Components by event type:
/// - crash/error: exception type (or a sentinel), then the top
///   [`STACK_FRAME_LIMIT`] frames' module/function pairs in order; with no
///   trace, the operation context stands in for the frames.
/// - log: the message with volatile tokens stripped, plus severity.
/// - span: the operation name; metric: the metric name.
/// - fallback (nothing discriminating present): event type + bundle id,
///   so indistinguishable events still group instead of each becoming its
///   own issue.
pub fn fingerprint(event: &EventRecord) -> String {
    let mut components: Vec<String> = Vec::new();
    components.push(event.event_type.as_str().to_string());

    match event.event_type {
        EventType::Crash | EventType::Error => {
            components.push(
                event
                    .exception_type
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_EXCEPTION.to_string()),
            );

            match &event.stack_trace {
                Some(frames) => {
                    for frame in frames.iter().take(STACK_FRAME_LIMIT) {
                        components.push(frame.module.clone());
                        components.push(frame.function.clone());
                    }
                }
                None => {
                    components.push(event.operation.clone().unwrap_or_default());
                }
            }
        }
        EventType::Log => match &event.message {
            Some(message) => {
                components.push(strip_volatile_tokens(message));
                components.push(
                    event
                        .severity
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                );
            }
            None => {
                components.push(event.bundle_id.clone().unwrap_or_default());
            }
        },
        EventType::Span => match &event.operation {
            Some(operation) => components.push(operation.clone()),
            None => components.push(event.bundle_id.clone().unwrap_or_default()),
        },
        EventType::Metric => match &event.metric_name {
            Some(name) => components.push(name.clone()),
            None => components.push(event.bundle_id.clone().unwrap_or_default()),
        },
    }

    digest(&components)
}

fn digest(components: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            hasher.update([DELIMITER as u8]);
        }
        hasher.update(component.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derive a human-readable issue title from an event.
pub fn issue_title(event: &EventRecord) -> String {
    match event.event_type {
        EventType::Crash | EventType::Error => {
            let exception = event
                .exception_type
                .as_deref()
                .unwrap_or(UNKNOWN_EXCEPTION);
            match &event.message {
                Some(message) => format!("{}: {}", exception, message),
                None => exception.to_string(),
            }
        }
        EventType::Log => event
            .message
            .clone()
            .unwrap_or_else(|| "log event".to_string()),
        EventType::Span => event
            .operation
            .clone()
            .unwrap_or_else(|| "span".to_string()),
        EventType::Metric => event
            .metric_name
            .clone()
            .unwrap_or_else(|| "metric".to_string()),
    }
}

/// Derive the culprit (blamed location) from an event: the topmost stack
/// frame when there is one, the operation otherwise.
pub fn issue_culprit(event: &EventRecord) -> Option<String> {
    if let Some(frames) = &event.stack_trace {
        if let Some(top) = frames.first() {
            if top.module.is_empty() {
                return Some(top.function.clone());
            }
            return Some(format!("{}.{}", top.module, top.function));
        }
    }
    event.operation.clone()
}
