//! Event normalization.
//!
//! This module handles:
//! - Parsing ingress payloads (3 formats: array, object with events, single)
//! - Hard validation of `event_type` against the fixed enum
//! - Per-field coercion of known scalar fields, nulling values that fail
//!   coercion instead of rejecting the whole event
//! - Per-index error reporting for batch submissions

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result, ValidationErrorCode};
use crate::event::{Breadcrumb, EventRecord, EventType, Severity, StackFrame};
use crate::limits::{
    MAX_BATCH_SIZE_BYTES, MAX_BREADCRUMBS, MAX_EVENT_SIZE_BYTES, MAX_EXCEPTION_TYPE_LEN,
    MAX_MAP_ENTRIES, MAX_MAP_VALUE_LEN, MAX_MESSAGE_LEN, MAX_STACK_FRAMES,
};

/// Explicit ingestion scope.
///
/// Workers process many organizations' events concurrently, so scope is
/// always passed as a parameter, never held in ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeContext {
    pub organization_id: String,
    pub project_id: String,
}

impl ScopeContext {
    pub fn new(organization_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Parsed ingress payload.
#[derive(Debug, Clone)]
pub struct IngressPayload {
    pub events: Vec<Value>,
}

impl IngressPayload {
    /// Parse an ingress payload from JSON bytes.
    /// Supports:
    /// 1. Array: `[event, event, ...]`
    /// 2. Object with events: `{ "events": [...] }`
    /// 3. Single event: `{ "event_type": "...", ... }`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_BATCH_SIZE_BYTES {
            return Err(Error::validation_code(
                ValidationErrorCode::BatchTooLarge,
                format!(
                    "payload {}KB exceeds {}KB limit",
                    bytes.len() / 1024,
                    MAX_BATCH_SIZE_BYTES / 1024
                ),
            ));
        }

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::validation(format!("invalid JSON: {}", e)))?;

        match value {
            Value::Array(events) => Ok(Self { events }),
            Value::Object(ref obj) => {
                if let Some(events) = obj.get("events") {
                    match events {
                        Value::Array(events) => Ok(Self {
                            events: events.clone(),
                        }),
                        _ => Err(Error::validation("'events' must be an array")),
                    }
                } else if obj.contains_key("event_type") {
                    Ok(Self {
                        events: vec![value],
                    })
                } else {
                    Err(Error::validation(
                        "object must have an 'events' array or be a single event with 'event_type'",
                    ))
                }
            }
            _ => Err(Error::validation(
                "request body must be an array of events or an object",
            )),
        }
    }
}

/// Normalize a single raw event into a canonical record.
///
/// `event_type` is a hard requirement: absence or an unknown value rejects
/// the event. Every other field is coerced individually; a field whose
/// value fails coercion is dropped, not fatal.
pub fn normalize_event(scope: &ScopeContext, raw: &Value) -> Result<EventRecord> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("event must be a JSON object"))?;

    let approx_size = raw.to_string().len();
    if approx_size > MAX_EVENT_SIZE_BYTES {
        return Err(Error::validation_code(
            ValidationErrorCode::EventTooLarge,
            format!(
                "event {}KB exceeds {}KB limit",
                approx_size / 1024,
                MAX_EVENT_SIZE_BYTES / 1024
            ),
        ));
    }

    let event_type = match obj.get("event_type") {
        Some(Value::String(s)) => {
            EventType::parse(s).ok_or_else(|| Error::InvalidEventType(s.clone()))?
        }
        Some(_) => return Err(Error::InvalidEventType("non-string".into())),
        None => return Err(Error::missing_field("event_type")),
    };

    let mut event = EventRecord::new(
        event_type,
        scope.organization_id.clone(),
        scope.project_id.clone(),
    );

    event.severity = coerce_severity(obj.get("severity"));
    event.message = coerce_string(obj.get("message")).map(|m| truncate(m, MAX_MESSAGE_LEN));
    event.exception_type =
        coerce_string(obj.get("exception_type")).map(|e| truncate(e, MAX_EXCEPTION_TYPE_LEN));
    event.stack_trace = coerce_stack_trace(obj.get("stack_trace"));

    event.app_version = coerce_string(obj.get("app_version"));
    event.app_build = coerce_string(obj.get("app_build"));
    event.bundle_id = coerce_string(obj.get("bundle_id"));
    event.environment = coerce_string(obj.get("environment"));

    event.device_model = coerce_string(obj.get("device_model"));
    event.device_id = coerce_string(obj.get("device_id"));
    event.os_name = coerce_string(obj.get("os_name"));
    event.os_version = coerce_string(obj.get("os_version"));
    event.locale = coerce_string(obj.get("locale"));
    event.timezone = coerce_string(obj.get("timezone"));

    event.memory_used = coerce_i64(obj.get("memory_used"));
    event.memory_total = coerce_i64(obj.get("memory_total"));
    event.disk_free = coerce_i64(obj.get("disk_free"));
    event.battery_level = coerce_f64(obj.get("battery_level"));

    event.trace_id = coerce_string(obj.get("trace_id"));
    event.span_id = coerce_string(obj.get("span_id"));
    event.parent_span_id = coerce_string(obj.get("parent_span_id"));
    event.operation = coerce_string(obj.get("operation"));
    event.duration_ms = coerce_f64(obj.get("duration_ms"));
    event.span_status = coerce_string(obj.get("span_status"));

    event.metric_name = coerce_string(obj.get("metric_name"));
    event.metric_value = coerce_f64(obj.get("metric_value"));
    event.metric_unit = coerce_string(obj.get("metric_unit"));

    event.user_id = coerce_string(obj.get("user_id"));
    event.session_id = coerce_string(obj.get("session_id"));

    event.tags = coerce_scalar_map(obj.get("tags"));
    event.context = coerce_scalar_map(obj.get("context"));
    event.breadcrumbs = coerce_breadcrumbs(obj.get("breadcrumbs"));

    Ok(event)
}

/// Normalize a batch of raw events, collecting per-index errors.
///
/// Accepted records and rejections are reported side by side so the
/// caller can acknowledge partial acceptance.
pub fn normalize_batch(
    scope: &ScopeContext,
    events: &[Value],
) -> (Vec<EventRecord>, Vec<(usize, Error)>) {
    let mut normalized = Vec::with_capacity(events.len());
    let mut errors = Vec::new();

    for (i, raw) in events.iter().enumerate() {
        match normalize_event(scope, raw) {
            Ok(event) => normalized.push(event),
            Err(e) => errors.push((i, e)),
        }
    }

    (normalized, errors)
}

fn truncate(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

/// Coerce a value to a string. Numbers and booleans are stringified;
/// nulls, arrays, and objects drop to None.
fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce a value to an i64. Accepts integers, integral floats, and
/// numeric strings.
fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Coerce a value to an f64. Accepts numbers and numeric strings.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Coerce a severity from a string level or an OTLP-style number.
fn coerce_severity(value: Option<&Value>) -> Option<Severity> {
    match value? {
        Value::String(s) => Severity::parse(s),
        Value::Number(n) => n
            .as_u64()
            .map(|n| Severity::from_otlp_number(n.min(u32::MAX as u64) as u32)),
        _ => None,
    }
}

/// Coerce a stack trace array. Frames that are not objects are dropped;
/// an empty result becomes None so "no usable trace" and "no trace"
/// fingerprint identically.
fn coerce_stack_trace(value: Option<&Value>) -> Option<Vec<StackFrame>> {
    let frames = value?.as_array()?;

    let coerced: Vec<StackFrame> = frames
        .iter()
        .take(MAX_STACK_FRAMES)
        .filter_map(|frame| {
            let obj = frame.as_object()?;
            Some(StackFrame {
                module: coerce_string(obj.get("module")).unwrap_or_default(),
                function: coerce_string(obj.get("function")).unwrap_or_default(),
                file: coerce_string(obj.get("file")),
                line: coerce_i64(obj.get("line")).and_then(|l| u32::try_from(l).ok()),
            })
        })
        .collect();

    if coerced.is_empty() {
        None
    } else {
        Some(coerced)
    }
}

/// Coerce a string-keyed map of scalars. Non-scalar values are dropped;
/// entry count and value length are capped.
fn coerce_scalar_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(obj)) = value else {
        return BTreeMap::new();
    };

    obj.iter()
        .filter_map(|(k, v)| {
            let scalar = match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }?;
            Some((k.clone(), truncate(scalar, MAX_MAP_VALUE_LEN)))
        })
        .take(MAX_MAP_ENTRIES)
        .collect()
}

fn coerce_breadcrumbs(value: Option<&Value>) -> Option<Vec<Breadcrumb>> {
    let crumbs = value?.as_array()?;

    let coerced: Vec<Breadcrumb> = crumbs
        .iter()
        .take(MAX_BREADCRUMBS)
        .filter_map(|crumb| {
            let obj = crumb.as_object()?;
            Some(Breadcrumb {
                timestamp: coerce_i64(obj.get("timestamp")),
                category: coerce_string(obj.get("category")),
                message: coerce_string(obj.get("message")),
                level: coerce_string(obj.get("level")),
            })
        })
        .collect();

    if coerced.is_empty() {
        None
    } else {
        Some(coerced)
    }
}
