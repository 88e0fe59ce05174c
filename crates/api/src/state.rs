//! Application state shared across handlers.

use std::sync::Arc;

use event_queue::EventPublisher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Event publisher (queue in production, mock in tests)
    pub publisher: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}
