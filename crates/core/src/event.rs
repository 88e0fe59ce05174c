//! Canonical event types for the telemetry pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// All supported event types.
///
/// Unknown event types are rejected at the normalization boundary, never
/// coerced into a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Crash,
    Error,
    Log,
    Metric,
    Span,
}

impl EventType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Error => "error",
            Self::Log => "log",
            Self::Metric => "metric",
            Self::Span => "span",
        }
    }

    /// Parses an event type string, returning None for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crash" => Some(Self::Crash),
            "error" => Some(Self::Error),
            "log" => Some(Self::Log),
            "metric" => Some(Self::Metric),
            "span" => Some(Self::Span),
            _ => None,
        }
    }

    /// Whether events of this type represent a failure condition.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Crash | Self::Error)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Parses a severity string, returning None for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "fatal" | "critical" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Maps an OTLP severity number to a severity level.
    ///
    /// Thresholds follow the OTLP log data model: FATAL=21..24,
    /// ERROR=17..20, WARN=13..16, INFO=9..12, DEBUG=5..8, TRACE=1..4.
    /// Zero (unspecified) maps to Info.
    pub fn from_otlp_number(n: u32) -> Self {
        match n {
            n if n >= 21 => Self::Fatal,
            n if n >= 17 => Self::Error,
            n if n >= 13 => Self::Warning,
            n if n >= 9 => Self::Info,
            n if n >= 5 => Self::Debug,
            n if n >= 1 => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One frame of a crash or error stack trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Module, library, or binary image the frame belongs to.
    #[serde(default)]
    pub module: String,
    /// Function or method name.
    #[serde(default)]
    pub function: String,
    /// Source file, when symbolication provided one.
    pub file: Option<String>,
    /// Source line, when symbolication provided one.
    pub line: Option<u32>,
}

/// A breadcrumb recorded by the SDK before the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Unix timestamp in milliseconds.
    pub timestamp: Option<i64>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub level: Option<String>,
}

/// Canonical wide event record.
///
/// One flat record captures every dimension of a single telemetry
/// occurrence. Nullable fields stay None when the SDK did not send them
/// or when coercion failed; only `event_type`, scope ids, and
/// `received_at` are guaranteed present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub severity: Option<Severity>,
    pub message: Option<String>,

    // Crash / error
    pub exception_type: Option<String>,
    pub stack_trace: Option<Vec<StackFrame>>,

    // Application
    pub app_version: Option<String>,
    pub app_build: Option<String>,
    pub bundle_id: Option<String>,
    pub environment: Option<String>,

    // Device
    pub device_model: Option<String>,
    pub device_id: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,

    // Resources
    pub memory_used: Option<i64>,
    pub memory_total: Option<i64>,
    pub disk_free: Option<i64>,
    pub battery_level: Option<f64>,

    // Span / trace
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub operation: Option<String>,
    pub duration_ms: Option<f64>,
    pub span_status: Option<String>,

    // Metric
    pub metric_name: Option<String>,
    pub metric_value: Option<f64>,
    pub metric_unit: Option<String>,

    // User / session
    pub user_id: Option<String>,
    pub session_id: Option<String>,

    // Free-form dimensions (scalar values, stringified)
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub breadcrumbs: Option<Vec<Breadcrumb>>,

    // Scope
    pub organization_id: String,
    pub project_id: String,

    /// Server receive timestamp.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Creates an empty record of the given type under a scope.
    ///
    /// Used by the normalizer as the starting point before field
    /// coercion fills in whatever the payload carried.
    pub fn new(
        event_type: EventType,
        organization_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            severity: None,
            message: None,
            exception_type: None,
            stack_trace: None,
            app_version: None,
            app_build: None,
            bundle_id: None,
            environment: None,
            device_model: None,
            device_id: None,
            os_name: None,
            os_version: None,
            locale: None,
            timezone: None,
            memory_used: None,
            memory_total: None,
            disk_free: None,
            battery_level: None,
            trace_id: None,
            span_id: None,
            parent_span_id: None,
            operation: None,
            duration_ms: None,
            span_status: None,
            metric_name: None,
            metric_value: None,
            metric_unit: None,
            user_id: None,
            session_id: None,
            tags: BTreeMap::new(),
            context: BTreeMap::new(),
            breadcrumbs: None,
            organization_id: organization_id.into(),
            project_id: project_id.into(),
            received_at: Utc::now(),
        }
    }

    /// The partition date this record lands in (UTC date of receipt).
    pub fn partition_date(&self) -> NaiveDate {
        self.received_at.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for ty in [
            EventType::Crash,
            EventType::Error,
            EventType::Log,
            EventType::Metric,
            EventType::Span,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("pageview"), None);
    }

    #[test]
    fn test_severity_from_otlp_number() {
        assert_eq!(Severity::from_otlp_number(24), Severity::Fatal);
        assert_eq!(Severity::from_otlp_number(21), Severity::Fatal);
        assert_eq!(Severity::from_otlp_number(17), Severity::Error);
        assert_eq!(Severity::from_otlp_number(13), Severity::Warning);
        assert_eq!(Severity::from_otlp_number(9), Severity::Info);
        assert_eq!(Severity::from_otlp_number(5), Severity::Debug);
        assert_eq!(Severity::from_otlp_number(1), Severity::Trace);
        assert_eq!(Severity::from_otlp_number(0), Severity::Info);
    }

    #[test]
    fn test_severity_parse_aliases() {
        assert_eq!(Severity::parse("warn"), Some(Severity::Warning));
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Fatal));
        assert_eq!(Severity::parse("verbose"), None);
    }

    #[test]
    fn test_partition_date_is_utc_receipt_date() {
        let mut event = EventRecord::new(EventType::Error, "org-1", "proj-1");
        event.received_at = "2024-03-15T23:59:59Z".parse().unwrap();
        assert_eq!(event.partition_date().to_string(), "2024-03-15");
    }
}
