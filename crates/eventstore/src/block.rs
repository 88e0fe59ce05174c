//! Columnar block encoding.
//!
//! A block is one self-describing Parquet file holding N wide event
//! records, ZSTD-compressed, one column per [`EventRecord`] field.
//! Nested collections (stack traces, tags, context, breadcrumbs) ride in
//! JSON string columns; everything the query layer filters on is a typed
//! scalar column.
//!
//! Blocks are written once and never appended to. Compaction replaces
//! them wholesale.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use pipeline_core::{EventRecord, EventType, Severity};

use crate::error::{EventStoreError, Result};

/// The storage schema shared by every block.
pub fn block_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new("event_type", DataType::Utf8, false),
                Field::new("severity", DataType::Utf8, true),
                Field::new("message", DataType::Utf8, true),
                Field::new("exception_type", DataType::Utf8, true),
                Field::new("stack_trace", DataType::Utf8, true),
                Field::new("app_version", DataType::Utf8, true),
                Field::new("app_build", DataType::Utf8, true),
                Field::new("bundle_id", DataType::Utf8, true),
                Field::new("environment", DataType::Utf8, true),
                Field::new("device_model", DataType::Utf8, true),
                Field::new("device_id", DataType::Utf8, true),
                Field::new("os_name", DataType::Utf8, true),
                Field::new("os_version", DataType::Utf8, true),
                Field::new("locale", DataType::Utf8, true),
                Field::new("timezone", DataType::Utf8, true),
                Field::new("memory_used", DataType::Int64, true),
                Field::new("memory_total", DataType::Int64, true),
                Field::new("disk_free", DataType::Int64, true),
                Field::new("battery_level", DataType::Float64, true),
                Field::new("trace_id", DataType::Utf8, true),
                Field::new("span_id", DataType::Utf8, true),
                Field::new("parent_span_id", DataType::Utf8, true),
                Field::new("operation", DataType::Utf8, true),
                Field::new("duration_ms", DataType::Float64, true),
                Field::new("span_status", DataType::Utf8, true),
                Field::new("metric_name", DataType::Utf8, true),
                Field::new("metric_value", DataType::Float64, true),
                Field::new("metric_unit", DataType::Utf8, true),
                Field::new("user_id", DataType::Utf8, true),
                Field::new("session_id", DataType::Utf8, true),
                Field::new("tags", DataType::Utf8, true),
                Field::new("context", DataType::Utf8, true),
                Field::new("breadcrumbs", DataType::Utf8, true),
                Field::new("organization_id", DataType::Utf8, false),
                Field::new("project_id", DataType::Utf8, false),
                Field::new("received_at", DataType::Int64, false),
            ]))
        })
        .clone()
}

fn opt_str<'a, F>(events: &'a [EventRecord], get: F) -> ArrayRef
where
    F: Fn(&'a EventRecord) -> Option<&'a str>,
{
    Arc::new(StringArray::from_iter(events.iter().map(get)))
}

fn req_str<'a, F>(events: &'a [EventRecord], get: F) -> ArrayRef
where
    F: Fn(&'a EventRecord) -> &'a str,
{
    Arc::new(StringArray::from_iter_values(events.iter().map(get)))
}

fn opt_i64<F>(events: &[EventRecord], get: F) -> ArrayRef
where
    F: Fn(&EventRecord) -> Option<i64>,
{
    Arc::new(Int64Array::from_iter(events.iter().map(get)))
}

fn opt_f64<F>(events: &[EventRecord], get: F) -> ArrayRef
where
    F: Fn(&EventRecord) -> Option<f64>,
{
    Arc::new(Float64Array::from_iter(events.iter().map(get)))
}

fn json_col<T: serde::Serialize>(value: Option<&T>) -> Option<String> {
    value.and_then(|v| serde_json::to_string(v).ok())
}

fn map_col(map: &BTreeMap<String, String>) -> Option<String> {
    if map.is_empty() {
        None
    } else {
        serde_json::to_string(map).ok()
    }
}

/// Encode records into one Parquet block.
pub fn encode_block(events: &[EventRecord]) -> Result<Bytes> {
    let schema = block_schema();

    let stack_traces: Vec<Option<String>> = events
        .iter()
        .map(|e| json_col(e.stack_trace.as_ref()))
        .collect();
    let breadcrumbs: Vec<Option<String>> = events
        .iter()
        .map(|e| json_col(e.breadcrumbs.as_ref()))
        .collect();
    let tags: Vec<Option<String>> = events.iter().map(|e| map_col(&e.tags)).collect();
    let contexts: Vec<Option<String>> = events.iter().map(|e| map_col(&e.context)).collect();

    let columns: Vec<ArrayRef> = vec![
        req_str(events, |e| e.event_type.as_str()),
        opt_str(events, |e| e.severity.map(|s| s.as_str())),
        opt_str(events, |e| e.message.as_deref()),
        opt_str(events, |e| e.exception_type.as_deref()),
        Arc::new(StringArray::from_iter(stack_traces)),
        opt_str(events, |e| e.app_version.as_deref()),
        opt_str(events, |e| e.app_build.as_deref()),
        opt_str(events, |e| e.bundle_id.as_deref()),
        opt_str(events, |e| e.environment.as_deref()),
        opt_str(events, |e| e.device_model.as_deref()),
        opt_str(events, |e| e.device_id.as_deref()),
        opt_str(events, |e| e.os_name.as_deref()),
        opt_str(events, |e| e.os_version.as_deref()),
        opt_str(events, |e| e.locale.as_deref()),
        opt_str(events, |e| e.timezone.as_deref()),
        opt_i64(events, |e| e.memory_used),
        opt_i64(events, |e| e.memory_total),
        opt_i64(events, |e| e.disk_free),
        opt_f64(events, |e| e.battery_level),
        opt_str(events, |e| e.trace_id.as_deref()),
        opt_str(events, |e| e.span_id.as_deref()),
        opt_str(events, |e| e.parent_span_id.as_deref()),
        opt_str(events, |e| e.operation.as_deref()),
        opt_f64(events, |e| e.duration_ms),
        opt_str(events, |e| e.span_status.as_deref()),
        opt_str(events, |e| e.metric_name.as_deref()),
        opt_f64(events, |e| e.metric_value),
        opt_str(events, |e| e.metric_unit.as_deref()),
        opt_str(events, |e| e.user_id.as_deref()),
        opt_str(events, |e| e.session_id.as_deref()),
        Arc::new(StringArray::from_iter(tags)),
        Arc::new(StringArray::from_iter(contexts)),
        Arc::new(StringArray::from_iter(breadcrumbs)),
        req_str(events, |e| e.organization_id.as_str()),
        req_str(events, |e| e.project_id.as_str()),
        Arc::new(Int64Array::from_iter_values(
            events.iter().map(|e| e.received_at.timestamp_millis()),
        )),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(buf.into())
}

struct ColumnView<'a> {
    batch: &'a RecordBatch,
}

impl<'a> ColumnView<'a> {
    fn str_at(&self, name: &str, row: usize) -> Option<String> {
        let col = self
            .batch
            .column_by_name(name)?
            .as_any()
            .downcast_ref::<StringArray>()?;
        if col.is_null(row) {
            None
        } else {
            Some(col.value(row).to_string())
        }
    }

    fn i64_at(&self, name: &str, row: usize) -> Option<i64> {
        let col = self
            .batch
            .column_by_name(name)?
            .as_any()
            .downcast_ref::<Int64Array>()?;
        if col.is_null(row) {
            None
        } else {
            Some(col.value(row))
        }
    }

    fn f64_at(&self, name: &str, row: usize) -> Option<f64> {
        let col = self
            .batch
            .column_by_name(name)?
            .as_any()
            .downcast_ref::<Float64Array>()?;
        if col.is_null(row) {
            None
        } else {
            Some(col.value(row))
        }
    }
}

/// Decode a Parquet block back into event records.
pub fn decode_block(data: Bytes) -> Result<Vec<EventRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;

    let mut events = Vec::new();
    for batch in reader {
        let batch = batch?;
        let view = ColumnView { batch: &batch };

        for row in 0..batch.num_rows() {
            events.push(decode_row(&view, row)?);
        }
    }

    Ok(events)
}

fn decode_row(view: &ColumnView<'_>, row: usize) -> Result<EventRecord> {
    let corrupt = |reason: &str| EventStoreError::Corrupt {
        path: String::new(),
        reason: format!("row {}: {}", row, reason),
    };

    let event_type_str = view
        .str_at("event_type", row)
        .ok_or_else(|| corrupt("missing event_type"))?;
    let event_type =
        EventType::parse(&event_type_str).ok_or_else(|| corrupt("unknown event_type"))?;

    let organization_id = view
        .str_at("organization_id", row)
        .ok_or_else(|| corrupt("missing organization_id"))?;
    let project_id = view
        .str_at("project_id", row)
        .ok_or_else(|| corrupt("missing project_id"))?;

    let mut event = EventRecord::new(event_type, organization_id, project_id);

    event.severity = view.str_at("severity", row).as_deref().and_then(Severity::parse);
    event.message = view.str_at("message", row);
    event.exception_type = view.str_at("exception_type", row);
    event.stack_trace = view
        .str_at("stack_trace", row)
        .and_then(|s| serde_json::from_str(&s).ok());

    event.app_version = view.str_at("app_version", row);
    event.app_build = view.str_at("app_build", row);
    event.bundle_id = view.str_at("bundle_id", row);
    event.environment = view.str_at("environment", row);

    event.device_model = view.str_at("device_model", row);
    event.device_id = view.str_at("device_id", row);
    event.os_name = view.str_at("os_name", row);
    event.os_version = view.str_at("os_version", row);
    event.locale = view.str_at("locale", row);
    event.timezone = view.str_at("timezone", row);

    event.memory_used = view.i64_at("memory_used", row);
    event.memory_total = view.i64_at("memory_total", row);
    event.disk_free = view.i64_at("disk_free", row);
    event.battery_level = view.f64_at("battery_level", row);

    event.trace_id = view.str_at("trace_id", row);
    event.span_id = view.str_at("span_id", row);
    event.parent_span_id = view.str_at("parent_span_id", row);
    event.operation = view.str_at("operation", row);
    event.duration_ms = view.f64_at("duration_ms", row);
    event.span_status = view.str_at("span_status", row);

    event.metric_name = view.str_at("metric_name", row);
    event.metric_value = view.f64_at("metric_value", row);
    event.metric_unit = view.str_at("metric_unit", row);

    event.user_id = view.str_at("user_id", row);
    event.session_id = view.str_at("session_id", row);

    event.tags = view
        .str_at("tags", row)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    event.context = view
        .str_at("context", row)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    event.breadcrumbs = view
        .str_at("breadcrumbs", row)
        .and_then(|s| serde_json::from_str(&s).ok());

    let millis = view
        .i64_at("received_at", row)
        .ok_or_else(|| corrupt("missing received_at"))?;
    event.received_at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| corrupt("received_at out of range"))?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::StackFrame;

    fn sample_event(i: usize) -> EventRecord {
        let mut event = EventRecord::new(EventType::Error, "org-1", "proj-1");
        event.exception_type = Some("SIGSEGV".into());
        event.message = Some(format!("fault {}", i));
        event.stack_trace = Some(vec![StackFrame {
            module: "MyApp".into(),
            function: "handler".into(),
            file: Some("handler.swift".into()),
            line: Some(12),
        }]);
        event.memory_used = Some(1024 * (i as i64 + 1));
        event.battery_level = Some(0.42);
        event.user_id = Some(format!("user-{}", i % 3));
        event.tags.insert("release".into(), "1.2.3".into());
        event.received_at = "2024-03-15T10:00:00Z".parse().unwrap();
        event
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let events: Vec<EventRecord> = (0..10).map(sample_event).collect();

        let bytes = encode_block(&events).unwrap();
        let decoded = decode_block(bytes).unwrap();

        assert_eq!(decoded.len(), events.len());
        for (original, restored) in events.iter().zip(decoded.iter()) {
            assert_eq!(restored.event_type, original.event_type);
            assert_eq!(restored.message, original.message);
            assert_eq!(restored.exception_type, original.exception_type);
            assert_eq!(restored.stack_trace, original.stack_trace);
            assert_eq!(restored.memory_used, original.memory_used);
            assert_eq!(restored.battery_level, original.battery_level);
            assert_eq!(restored.tags, original.tags);
            assert_eq!(restored.received_at, original.received_at);
        }
    }

    #[test]
    fn test_empty_optionals_stay_empty() {
        let event = EventRecord::new(EventType::Log, "org-1", "proj-1");
        let decoded = decode_block(encode_block(&[event]).unwrap()).unwrap();

        let restored = &decoded[0];
        assert!(restored.message.is_none());
        assert!(restored.stack_trace.is_none());
        assert!(restored.tags.is_empty());
        assert!(restored.breadcrumbs.is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_block(Bytes::from_static(b"not a parquet file")).is_err());
    }

    #[test]
    fn test_encode_empty_block() {
        let decoded = decode_block(encode_block(&[]).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }
}
