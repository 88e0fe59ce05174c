//! SDK ingestion endpoint.
//!
//! Accepts events in 3 formats:
//! 1. Array: `[event, event, ...]`
//! 2. Object with events: `{ "events": [...] }`
//! 3. Single event: `{ "event_type": "...", ... }`
//!
//! Normalizes per event, reports rejections per index, and publishes
//! accepted records to the queue.

use axum::{body::Bytes, extract::State, Json};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use pipeline_core::limits::{MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES};
use pipeline_core::{normalize_batch, IngressPayload, ValidationErrorCode};
use telemetry::metrics;

use crate::extractors::Scope;
use crate::response::{ApiError, EventRejection, IngestResponse};
use crate::state::AppState;

/// POST /ingest - Primary SDK ingestion endpoint.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Scope(scope): Scope,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let start = Instant::now();

    metrics().batches_received.inc();

    // Check payload size before parsing
    if body.len() > MAX_BATCH_SIZE_BYTES {
        return Err(ApiError::validation(
            ValidationErrorCode::BatchTooLarge.code(),
            vec![format!(
                "Payload size {}KB exceeds {}KB limit",
                body.len() / 1024,
                MAX_BATCH_SIZE_BYTES / 1024
            )],
        ));
    }

    debug!(
        organization_id = %scope.organization_id,
        project_id = %scope.project_id,
        payload_size = body.len(),
        "Received event batch"
    );

    let payload = IngressPayload::parse(&body).map_err(|e| {
        error!("Failed to parse ingress payload: {}", e);
        ApiError::from(e)
    })?;

    let total_events = payload.events.len();
    metrics().events_received.inc_by(total_events as u64);

    if total_events > MAX_BATCH_EVENTS {
        return Err(ApiError::validation(
            ValidationErrorCode::BatchTooLarge.code(),
            vec![format!(
                "Batch has {} events, exceeds {} limit",
                total_events, MAX_BATCH_EVENTS
            )],
        ));
    }

    let (accepted_events, rejections) = normalize_batch(&scope, &payload.events);

    let accepted = accepted_events.len();
    let rejected = rejections.len();

    if rejected > 0 {
        warn!(
            project_id = %scope.project_id,
            accepted = accepted,
            rejected = rejected,
            "Some events failed validation"
        );
        metrics().events_rejected.inc_by(rejected as u64);
    }

    metrics().events_accepted.inc_by(accepted as u64);

    if !accepted_events.is_empty() {
        let send_result = state
            .publisher
            .publish_events(accepted_events)
            .await
            .map_err(|e| {
                error!("Failed to publish events to queue: {}", e);
                ApiError::internal("Failed to store events")
            })?;

        if !send_result.errors.is_empty() {
            warn!(
                project_id = %scope.project_id,
                send_errors = ?send_result.errors,
                "Some events failed to publish"
            );
        }
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    metrics().ingest_latency_ms.observe(latency_ms);

    info!(
        project_id = %scope.project_id,
        accepted = accepted,
        rejected = rejected,
        latency_ms = latency_ms,
        "Batch processed"
    );

    if rejected > 0 {
        let errors: Vec<EventRejection> = rejections
            .into_iter()
            .map(|(index, e)| EventRejection {
                index,
                reason: e.to_string(),
            })
            .collect();
        Ok(Json(IngestResponse::partial(accepted, errors)))
    } else {
        Ok(Json(IngestResponse::success(accepted)))
    }
}
