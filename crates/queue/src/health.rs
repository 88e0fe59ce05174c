//! Queue health checks.

use rskafka::client::ClientBuilder;
use tracing::{debug, error};

use crate::config::QueueConfig;

/// Check queue connection health.
pub async fn check_connection(config: &QueueConfig) -> bool {
    let connection = config.broker_string();

    match ClientBuilder::new(vec![connection]).build().await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Queue connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list queue topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to connect to queue: {}", e);
            false
        }
    }
}

/// Verify required topics exist; returns the missing ones.
pub async fn missing_topics(config: &QueueConfig, topics: &[&str]) -> Vec<String> {
    let connection = config.broker_string();

    match ClientBuilder::new(vec![connection]).build().await {
        Ok(client) => match client.list_topics().await {
            Ok(existing_topics) => {
                let existing: std::collections::HashSet<_> =
                    existing_topics.iter().map(|t| t.name.as_str()).collect();

                topics
                    .iter()
                    .filter(|t| !existing.contains(*t))
                    .map(|t| t.to_string())
                    .collect()
            }
            Err(_) => topics.iter().map(|t| t.to_string()).collect(),
        },
        Err(_) => topics.iter().map(|t| t.to_string()).collect(),
    }
}
