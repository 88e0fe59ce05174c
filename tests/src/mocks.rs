//! Mock implementations for testing.

use async_trait::async_trait;
use event_queue::{EventPublisher, SendResult};
use parking_lot::Mutex;
use pipeline_core::{EventRecord, Result};
use std::sync::Arc;

/// Mock publisher that captures events in memory.
///
/// Implements the same `EventPublisher` trait as the real `Producer`,
/// so tests can verify the exact records that would be published
/// without a broker.
#[derive(Clone)]
pub struct MockPublisher {
    /// All events published through this publisher.
    events: Arc<Mutex<Vec<EventRecord>>>,
    /// Simulate failures if set.
    should_fail: Arc<Mutex<bool>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Get all captured events.
    pub fn captured_events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    /// Get the count of captured events.
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Clear captured events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish_events(&self, events: Vec<EventRecord>) -> Result<SendResult> {
        if *self.should_fail.lock() {
            return Err(pipeline_core::Error::internal("Mock publisher failure"));
        }

        let count = events.len();
        self.events.lock().extend(events);

        Ok(SendResult {
            events_sent: count,
            errors: vec![],
        })
    }

    fn is_healthy(&self) -> bool {
        !*self.should_fail.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::{EventRecord, EventType};

    fn test_event(message: &str) -> EventRecord {
        let mut event = EventRecord::new(EventType::Error, "org-test", "proj-test");
        event.message = Some(message.into());
        event
    }

    #[tokio::test]
    async fn test_mock_publisher_captures_events() {
        let mock = MockPublisher::new();

        let result = mock
            .publish_events(vec![test_event("e1")])
            .await
            .unwrap();
        assert_eq!(result.events_sent, 1);
        assert_eq!(mock.event_count(), 1);

        let captured = mock.captured_events();
        assert_eq!(captured[0].message.as_deref(), Some("e1"));
    }

    #[tokio::test]
    async fn test_mock_publisher_failure_mode() {
        let mock = MockPublisher::new();
        mock.set_should_fail(true);

        let result = mock.publish_events(vec![]).await;
        assert!(result.is_err());
        assert!(!mock.is_healthy());
    }
}
