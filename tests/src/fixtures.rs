//! Test fixtures and event generators.

use serde_json::{json, Value};

/// Scope headers the gateway would inject.
pub const TEST_ORG: &str = "org-test";
pub const TEST_PROJECT: &str = "proj-test";

/// A valid error event with a stack trace.
pub fn error_event(exception: &str) -> Value {
    json!({
        "event_type": "error",
        "severity": "error",
        "exception_type": exception,
        "message": "something went sideways",
        "stack_trace": [
            {"module": "MyApp", "function": "foo"},
            {"module": "MyApp", "function": "bar"}
        ],
        "bundle_id": "com.example.app",
        "app_version": "2.1.0",
        "os_name": "iOS",
        "os_version": "17.4"
    })
}

/// A valid crash event.
pub fn crash_event() -> Value {
    json!({
        "event_type": "crash",
        "severity": "fatal",
        "exception_type": "EXC_BAD_ACCESS",
        "stack_trace": [
            {"module": "MyApp", "function": "deref_null", "line": 88}
        ],
        "bundle_id": "com.example.app",
        "device_model": "iPhone15,2",
        "memory_used": 512000000
    })
}

/// A valid log event.
pub fn log_event(message: &str) -> Value {
    json!({
        "event_type": "log",
        "severity": "warning",
        "message": message,
        "bundle_id": "com.example.app"
    })
}

/// An event with a user attached.
pub fn error_event_for_user(exception: &str, user_id: &str) -> Value {
    let mut event = error_event(exception);
    event["user_id"] = json!(user_id);
    event
}

/// An event of an unknown type (must be rejected).
pub fn bogus_event() -> Value {
    json!({
        "event_type": "pageview",
        "message": "not a telemetry event type"
    })
}

/// Generate N valid error events.
pub fn error_events(n: usize) -> Vec<Value> {
    (0..n).map(|_| error_event("NSGenericException")).collect()
}

/// Array format payload.
pub fn array_payload(events: Vec<Value>) -> String {
    serde_json::to_string(&events).unwrap()
}

/// Object format payload.
pub fn object_payload(events: Vec<Value>) -> String {
    json!({ "events": events }).to_string()
}

/// Single event payload.
pub fn single_payload(event: Value) -> String {
    event.to_string()
}

/// A batch that exceeds the event limit.
pub fn oversized_batch() -> Vec<Value> {
    error_events(1001) // Exceeds 1000 limit
}

/// An OTLP logs export request with one record per given severity number.
pub fn otlp_logs_payload(severity_numbers: &[u32]) -> String {
    let records: Vec<Value> = severity_numbers
        .iter()
        .map(|n| {
            json!({
                "timeUnixNano": "1700000000000000000",
                "severityNumber": n,
                "body": {"stringValue": format!("log at severity {}", n)}
            })
        })
        .collect();

    json!({
        "resourceLogs": [{
            "resource": {
                "attributes": [
                    {"key": "service.name", "value": {"stringValue": "com.example.app"}}
                ]
            },
            "scopeLogs": [{"logRecords": records}]
        }]
    })
    .to_string()
}

/// An OTLP traces export request with one span.
pub fn otlp_traces_payload(operation: &str) -> String {
    json!({
        "resourceSpans": [{
            "resource": {
                "attributes": [
                    {"key": "service.name", "value": {"stringValue": "com.example.app"}}
                ]
            },
            "scopeSpans": [{
                "spans": [{
                    "traceId": "0123456789abcdef",
                    "spanId": "fedcba98",
                    "name": operation,
                    "startTimeUnixNano": "1700000000000000000",
                    "endTimeUnixNano": "1700000000100000000",
                    "status": {"code": 1}
                }]
            }]
        }]
    })
    .to_string()
}
