//! End-to-end ingestion API tests.

use integration_tests::fixtures::*;
use integration_tests::setup::TestContext;

use pipeline_core::EventType;

#[tokio::test]
async fn test_ingest_array_format() {
    let ctx = TestContext::new();

    let response = ctx.ingest(array_payload(error_events(3))).await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["received"], 3);
    assert_eq!(ctx.captured_event_count(), 3);
}

#[tokio::test]
async fn test_ingest_object_format() {
    let ctx = TestContext::new();

    let response = ctx
        .ingest(object_payload(vec![crash_event(), log_event("disk full")]))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], 2);

    let captured = ctx.captured_events();
    assert_eq!(captured[0].event_type, EventType::Crash);
    assert_eq!(captured[1].event_type, EventType::Log);
}

#[tokio::test]
async fn test_ingest_single_event_format() {
    let ctx = TestContext::new();

    let response = ctx.ingest(single_payload(error_event("SIGABRT"))).await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], 1);
}

#[tokio::test]
async fn test_scope_is_stamped_from_headers() {
    let ctx = TestContext::new();

    ctx.ingest(single_payload(crash_event())).await.assert_status_ok();

    let captured = ctx.captured_events();
    assert_eq!(captured[0].organization_id, TEST_ORG);
    assert_eq!(captured[0].project_id, TEST_PROJECT);
}

#[tokio::test]
async fn test_partial_acceptance_reports_per_index_errors() {
    let ctx = TestContext::new();

    let payload = array_payload(vec![
        error_event("SIGSEGV"),
        bogus_event(),
        log_event("still fine"),
    ]);
    let response = ctx.ingest(payload).await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], 2);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 1);
    assert!(errors[0]["reason"]
        .as_str()
        .unwrap()
        .contains("invalid event type"));

    // Only the accepted events reached the queue.
    assert_eq!(ctx.captured_event_count(), 2);
}

#[tokio::test]
async fn test_missing_scope_headers_rejected() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/ingest")
        .add_header("Content-Type", "application/json")
        .text(single_payload(crash_event()))
        .await;

    response.assert_status_bad_request();
    assert_eq!(ctx.captured_event_count(), 0);
}

#[tokio::test]
async fn test_oversized_batch_rejected() {
    let ctx = TestContext::new();

    let response = ctx.ingest(array_payload(oversized_batch())).await;
    response.assert_status_bad_request();

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_002");
    assert_eq!(ctx.captured_event_count(), 0);
}

#[tokio::test]
async fn test_invalid_json_rejected() {
    let ctx = TestContext::new();

    let response = ctx.ingest("{not json".to_string()).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_publisher_failure_is_internal_error() {
    let ctx = TestContext::new();
    ctx.set_publisher_failure(true);

    let response = ctx.ingest(single_payload(crash_event())).await;
    response.assert_status_internal_server_error();
}

#[tokio::test]
async fn test_otlp_logs_export() {
    let ctx = TestContext::new();

    let response = ctx
        .export_otlp("/v1/logs", otlp_logs_payload(&[21, 13, 9]))
        .await;
    response.assert_status_ok();

    let captured = ctx.captured_events();
    assert_eq!(captured.len(), 3);
    assert!(captured.iter().all(|e| e.event_type == EventType::Log));
    assert_eq!(
        captured[0].severity.map(|s| s.as_str().to_string()),
        Some("fatal".to_string())
    );
    assert_eq!(captured[0].bundle_id.as_deref(), Some("com.example.app"));
}

#[tokio::test]
async fn test_otlp_traces_export() {
    let ctx = TestContext::new();

    let response = ctx
        .export_otlp("/v1/traces", otlp_traces_payload("GET /users"))
        .await;
    response.assert_status_ok();

    let captured = ctx.captured_events();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].event_type, EventType::Span);
    assert_eq!(captured[0].operation.as_deref(), Some("GET /users"));
    assert_eq!(captured[0].duration_ms, Some(100.0));
}

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new();

    ctx.server.get("/health").await.assert_status_ok();
    ctx.server.get("/health/live").await.assert_status_ok();
}
