//! Common test setup functions.

use std::sync::Arc;

use api::{router, AppState};
use axum_test::TestServer;
use event_queue::EventPublisher;
use pipeline_core::EventRecord;

use crate::fixtures::{TEST_ORG, TEST_PROJECT};
use crate::mocks::MockPublisher;

/// Test context: the real router over a mock publisher.
///
/// The production code paths run unchanged; only the queue transport is
/// swapped for an in-memory capture.
pub struct TestContext {
    pub mock_publisher: Arc<MockPublisher>,
    pub server: TestServer,
}

impl TestContext {
    /// Create a new test context.
    pub fn new() -> Self {
        let mock_publisher = Arc::new(MockPublisher::new());

        let state = AppState::new(mock_publisher.clone() as Arc<dyn EventPublisher>);
        let server = TestServer::new(router(state)).expect("Failed to start test server");

        Self {
            mock_publisher,
            server,
        }
    }

    /// POST a payload to /ingest with the standard scope headers.
    pub async fn ingest(&self, payload: String) -> axum_test::TestResponse {
        self.server
            .post("/ingest")
            .add_header("X-Organization-Id", TEST_ORG)
            .add_header("X-Project-Id", TEST_PROJECT)
            .add_header("Content-Type", "application/json")
            .text(payload)
            .await
    }

    /// POST an OTLP export payload to the given signal path.
    pub async fn export_otlp(&self, path: &str, payload: String) -> axum_test::TestResponse {
        self.server
            .post(path)
            .add_header("X-Organization-Id", TEST_ORG)
            .add_header("X-Project-Id", TEST_PROJECT)
            .add_header("Content-Type", "application/json")
            .text(payload)
            .await
    }

    /// Get all events captured by the mock publisher.
    pub fn captured_events(&self) -> Vec<EventRecord> {
        self.mock_publisher.captured_events()
    }

    /// Get count of captured events.
    pub fn captured_event_count(&self) -> usize {
        self.mock_publisher.event_count()
    }

    /// Clear captured events (use between tests).
    pub fn clear_captured(&self) {
        self.mock_publisher.clear();
    }

    /// Set the mock publisher to fail (for error testing).
    pub fn set_publisher_failure(&self, should_fail: bool) {
        self.mock_publisher.set_should_fail(should_fail);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
