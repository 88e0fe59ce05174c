//! OTLP/HTTP JSON ingress decoding.
//!
//! Export requests are decoded into explicit tagged structs per record
//! kind (spans, logs, metrics) with exhaustive-match conversion into
//! canonical [`EventRecord`]s. Unknown fields are ignored: exporters
//! routinely send newer fields than the decoder knows about.
//!
//! OTLP encodes 64-bit integers (timestamps, counters) as JSON strings;
//! the [`Nanos`] and [`IntString`] wrappers accept both encodings.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::event::{EventRecord, EventType, Severity};
use crate::normalize::ScopeContext;

/// Convert an OTLP nanosecond timestamp to a millisecond scalar.
pub fn nanos_to_millis(nanos: u64) -> i64 {
    (nanos / 1_000_000) as i64
}

/// Nanosecond timestamp, JSON-encoded as either a string or a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nanos(pub u64);

impl<'de> Deserialize<'de> for Nanos {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(Nanos(n)),
            Raw::Str(s) => Ok(Nanos(s.parse().unwrap_or(0))),
        }
    }
}

/// 64-bit integer, JSON-encoded as either a string or a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntString(pub i64);

impl<'de> Deserialize<'de> for IntString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(IntString(n)),
            Raw::Str(s) => Ok(IntString(s.parse().unwrap_or(0))),
        }
    }
}

/// OTLP typed attribute value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: Option<String>,
    pub int_value: Option<IntString>,
    pub double_value: Option<f64>,
    pub bool_value: Option<bool>,
}

impl AnyValue {
    /// Render the value as a string, whichever variant is set.
    pub fn render(&self) -> Option<String> {
        if let Some(s) = &self.string_value {
            return Some(s.clone());
        }
        if let Some(i) = &self.int_value {
            return Some(i.0.to_string());
        }
        if let Some(d) = &self.double_value {
            return Some(d.to_string());
        }
        self.bool_value.map(|b| b.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<AnyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

// --- Traces ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceExportRequest {
    #[serde(default)]
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_time_unix_nano: Nanos,
    #[serde(default)]
    pub end_time_unix_nano: Nanos,
    pub status: Option<SpanStatus>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanStatus {
    pub code: Option<u32>,
    pub message: Option<String>,
}

impl SpanStatus {
    /// Map the OTLP status code enum to its string form.
    pub fn as_str(&self) -> &'static str {
        match self.code.unwrap_or(0) {
            1 => "ok",
            2 => "error",
            _ => "unset",
        }
    }
}

// --- Logs ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsExportRequest {
    #[serde(default)]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub time_unix_nano: Nanos,
    pub severity_number: Option<u32>,
    pub severity_text: Option<String>,
    pub body: Option<AnyValue>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

// --- Metrics ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExportRequest {
    #[serde(default)]
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetrics {
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub name: String,
    pub unit: Option<String>,
    pub gauge: Option<DataPoints>,
    pub sum: Option<DataPoints>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoints {
    #[serde(default)]
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    #[serde(default)]
    pub time_unix_nano: Nanos,
    pub as_double: Option<f64>,
    pub as_int: Option<IntString>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

impl NumberDataPoint {
    pub fn value(&self) -> Option<f64> {
        self.as_double.or_else(|| self.as_int.map(|i| i.0 as f64))
    }
}

// --- Conversion ---

/// Apply OTLP resource attributes to a record using the semantic
/// conventions mobile SDK exporters emit.
fn apply_resource(event: &mut EventRecord, resource: Option<&Resource>) {
    let Some(resource) = resource else { return };

    for kv in &resource.attributes {
        let Some(value) = kv.value.as_ref().and_then(AnyValue::render) else {
            continue;
        };
        match kv.key.as_str() {
            "service.name" => event.bundle_id = Some(value),
            "service.version" => event.app_version = Some(value),
            "deployment.environment" => event.environment = Some(value),
            "os.name" => event.os_name = Some(value),
            "os.version" => event.os_version = Some(value),
            "device.model.identifier" => event.device_model = Some(value),
            "device.id" => event.device_id = Some(value),
            _ => {
                event.context.insert(kv.key.clone(), value);
            }
        }
    }
}

fn apply_attributes(event: &mut EventRecord, attributes: &[KeyValue]) {
    for kv in attributes {
        if let Some(value) = kv.value.as_ref().and_then(AnyValue::render) {
            event.tags.insert(kv.key.clone(), value);
        }
    }
}

/// Decode an OTLP trace export request into span event records.
pub fn decode_traces(scope: &ScopeContext, body: &[u8]) -> Result<Vec<EventRecord>> {
    let request: TraceExportRequest = serde_json::from_slice(body)
        .map_err(|e| Error::validation(format!("invalid OTLP traces payload: {}", e)))?;

    let mut events = Vec::new();
    for resource_spans in &request.resource_spans {
        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                let mut event = EventRecord::new(
                    EventType::Span,
                    scope.organization_id.clone(),
                    scope.project_id.clone(),
                );
                apply_resource(&mut event, resource_spans.resource.as_ref());
                apply_attributes(&mut event, &span.attributes);

                event.trace_id = Some(span.trace_id.clone());
                event.span_id = Some(span.span_id.clone());
                event.parent_span_id = span.parent_span_id.clone();
                event.operation = Some(span.name.clone());

                let start_ms = nanos_to_millis(span.start_time_unix_nano.0);
                let end_ms = nanos_to_millis(span.end_time_unix_nano.0);
                if end_ms >= start_ms && span.end_time_unix_nano.0 > 0 {
                    event.duration_ms = Some((end_ms - start_ms) as f64);
                }

                let status = span.status.clone().unwrap_or_default();
                event.span_status = Some(status.as_str().to_string());
                if status.code == Some(2) {
                    event.severity = Some(Severity::Error);
                }

                events.push(event);
            }
        }
    }

    Ok(events)
}

/// Decode an OTLP logs export request into log event records.
pub fn decode_logs(scope: &ScopeContext, body: &[u8]) -> Result<Vec<EventRecord>> {
    let request: LogsExportRequest = serde_json::from_slice(body)
        .map_err(|e| Error::validation(format!("invalid OTLP logs payload: {}", e)))?;

    let mut events = Vec::new();
    for resource_logs in &request.resource_logs {
        for scope_logs in &resource_logs.scope_logs {
            for record in &scope_logs.log_records {
                let mut event = EventRecord::new(
                    EventType::Log,
                    scope.organization_id.clone(),
                    scope.project_id.clone(),
                );
                apply_resource(&mut event, resource_logs.resource.as_ref());
                apply_attributes(&mut event, &record.attributes);

                event.severity = match record.severity_number {
                    Some(n) => Some(Severity::from_otlp_number(n)),
                    None => record
                        .severity_text
                        .as_deref()
                        .and_then(Severity::parse)
                        .or(Some(Severity::Info)),
                };
                event.message = record.body.as_ref().and_then(AnyValue::render);
                event.trace_id = record.trace_id.clone();
                event.span_id = record.span_id.clone();

                events.push(event);
            }
        }
    }

    Ok(events)
}

/// Decode an OTLP metrics export request into metric event records,
/// one record per gauge or sum data point.
pub fn decode_metrics(scope: &ScopeContext, body: &[u8]) -> Result<Vec<EventRecord>> {
    let request: MetricsExportRequest = serde_json::from_slice(body)
        .map_err(|e| Error::validation(format!("invalid OTLP metrics payload: {}", e)))?;

    let mut events = Vec::new();
    for resource_metrics in &request.resource_metrics {
        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                let points = metric
                    .gauge
                    .iter()
                    .chain(metric.sum.iter())
                    .flat_map(|p| p.data_points.iter());

                for point in points {
                    let mut event = EventRecord::new(
                        EventType::Metric,
                        scope.organization_id.clone(),
                        scope.project_id.clone(),
                    );
                    apply_resource(&mut event, resource_metrics.resource.as_ref());
                    apply_attributes(&mut event, &point.attributes);

                    event.metric_name = Some(metric.name.clone());
                    event.metric_unit = metric.unit.clone();
                    event.metric_value = point.value();

                    events.push(event);
                }
            }
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ScopeContext {
        ScopeContext::new("org-1", "proj-1")
    }

    #[test]
    fn test_nanos_accepts_string_and_number() {
        let n: Nanos = serde_json::from_str("\"1700000000000000000\"").unwrap();
        assert_eq!(n.0, 1_700_000_000_000_000_000);
        let n: Nanos = serde_json::from_str("1700000000000000000").unwrap();
        assert_eq!(n.0, 1_700_000_000_000_000_000);
    }

    #[test]
    fn test_nanos_to_millis() {
        assert_eq!(nanos_to_millis(1_700_000_000_123_456_789), 1_700_000_000_123);
        assert_eq!(nanos_to_millis(999_999), 0);
    }

    #[test]
    fn test_decode_traces_span_duration_and_status() {
        let body = serde_json::json!({
            "resourceSpans": [{
                "resource": {
                    "attributes": [
                        {"key": "service.name", "value": {"stringValue": "com.example.app"}},
                        {"key": "service.version", "value": {"stringValue": "2.1.0"}}
                    ]
                },
                "scopeSpans": [{
                    "spans": [{
                        "traceId": "abc123",
                        "spanId": "def456",
                        "name": "GET /users",
                        "startTimeUnixNano": "1700000000000000000",
                        "endTimeUnixNano": "1700000000250000000",
                        "status": {"code": 2},
                        "attributes": [
                            {"key": "http.method", "value": {"stringValue": "GET"}}
                        ]
                    }]
                }]
            }]
        });

        let events = decode_traces(&scope(), body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let span = &events[0];
        assert_eq!(span.event_type, EventType::Span);
        assert_eq!(span.operation.as_deref(), Some("GET /users"));
        assert_eq!(span.duration_ms, Some(250.0));
        assert_eq!(span.span_status.as_deref(), Some("error"));
        assert_eq!(span.severity, Some(Severity::Error));
        assert_eq!(span.bundle_id.as_deref(), Some("com.example.app"));
        assert_eq!(span.app_version.as_deref(), Some("2.1.0"));
        assert_eq!(span.tags.get("http.method").map(String::as_str), Some("GET"));
    }

    #[test]
    fn test_decode_logs_severity_thresholds() {
        let body = serde_json::json!({
            "resourceLogs": [{
                "scopeLogs": [{
                    "logRecords": [
                        {"severityNumber": 21, "body": {"stringValue": "fatal thing"}},
                        {"severityNumber": 13, "body": {"stringValue": "warn thing"}},
                        {"severityText": "DEBUG", "body": {"stringValue": "debug thing"}},
                        {"body": {"stringValue": "bare thing"}}
                    ]
                }]
            }]
        });

        let events = decode_logs(&scope(), body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].severity, Some(Severity::Fatal));
        assert_eq!(events[1].severity, Some(Severity::Warning));
        assert_eq!(events[2].severity, Some(Severity::Debug));
        assert_eq!(events[3].severity, Some(Severity::Info));
        assert_eq!(events[0].message.as_deref(), Some("fatal thing"));
    }

    #[test]
    fn test_decode_metrics_one_event_per_data_point() {
        let body = serde_json::json!({
            "resourceMetrics": [{
                "scopeMetrics": [{
                    "metrics": [{
                        "name": "app.memory.usage",
                        "unit": "By",
                        "gauge": {
                            "dataPoints": [
                                {"asInt": "104857600"},
                                {"asDouble": 1.5e8}
                            ]
                        }
                    }]
                }]
            }]
        });

        let events = decode_metrics(&scope(), body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].metric_name.as_deref(), Some("app.memory.usage"));
        assert_eq!(events[0].metric_value, Some(104_857_600.0));
        assert_eq!(events[1].metric_value, Some(1.5e8));
        assert_eq!(events[0].metric_unit.as_deref(), Some("By"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let body = serde_json::json!({
            "resourceLogs": [{
                "schemaUrl": "https://example.com/schema",
                "scopeLogs": [{
                    "scope": {"name": "ios-sdk"},
                    "logRecords": [{
                        "body": {"stringValue": "hello"},
                        "observedTimeUnixNano": "1700000000000000000",
                        "flags": 1
                    }]
                }]
            }]
        });

        let events = decode_logs(&scope(), body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
    }
}
