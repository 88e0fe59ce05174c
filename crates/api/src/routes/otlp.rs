//! OTLP/HTTP JSON export endpoints.
//!
//! One endpoint per signal, mirroring the OTLP HTTP path layout
//! (`/v1/traces`, `/v1/logs`, `/v1/metrics`). Decoded records flow into
//! the same queue as SDK events.

use axum::{body::Bytes, extract::State, Json};
use tracing::{debug, error};

use pipeline_core::{otlp, EventRecord};
use telemetry::metrics;

use crate::extractors::Scope;
use crate::response::{ApiError, OtlpExportResponse};
use crate::state::AppState;

/// POST /v1/traces - OTLP trace export.
pub async fn traces_handler(
    State(state): State<AppState>,
    Scope(scope): Scope,
    body: Bytes,
) -> Result<Json<OtlpExportResponse>, ApiError> {
    let events = otlp::decode_traces(&scope, &body).map_err(ApiError::from)?;
    publish(&state, "traces", events).await
}

/// POST /v1/logs - OTLP logs export.
pub async fn logs_handler(
    State(state): State<AppState>,
    Scope(scope): Scope,
    body: Bytes,
) -> Result<Json<OtlpExportResponse>, ApiError> {
    let events = otlp::decode_logs(&scope, &body).map_err(ApiError::from)?;
    publish(&state, "logs", events).await
}

/// POST /v1/metrics - OTLP metrics export.
pub async fn metrics_handler(
    State(state): State<AppState>,
    Scope(scope): Scope,
    body: Bytes,
) -> Result<Json<OtlpExportResponse>, ApiError> {
    let events = otlp::decode_metrics(&scope, &body).map_err(ApiError::from)?;
    publish(&state, "metrics", events).await
}

async fn publish(
    state: &AppState,
    signal: &str,
    events: Vec<EventRecord>,
) -> Result<Json<OtlpExportResponse>, ApiError> {
    let total = events.len();
    metrics().events_received.inc_by(total as u64);

    if events.is_empty() {
        return Ok(Json(OtlpExportResponse::full()));
    }

    let send_result = state.publisher.publish_events(events).await.map_err(|e| {
        error!(signal = signal, "Failed to publish OTLP events: {}", e);
        ApiError::internal("Failed to store events")
    })?;

    metrics().events_accepted.inc_by(send_result.events_sent as u64);

    debug!(
        signal = signal,
        received = total,
        published = send_result.events_sent,
        "OTLP export processed"
    );

    let rejected = total.saturating_sub(send_result.events_sent);
    if rejected > 0 {
        metrics().events_rejected.inc_by(rejected as u64);
        return Ok(Json(OtlpExportResponse::partial(
            rejected as u64,
            send_result.errors.join("; "),
        )));
    }

    Ok(Json(OtlpExportResponse::full()))
}
