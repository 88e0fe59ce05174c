//! Watchtower telemetry ingestion service.
//!
//! The full pipeline in one process:
//! - HTTP ingress (SDK batches + OTLP exports) published to the queue
//! - Ingest workers: fingerprint -> issue aggregation -> partition writer
//! - Background compaction over the columnar store

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use api::{router, AppState};
use event_queue::{Consumer, Producer, QueueConfig};
use event_store::{
    create_object_store, start_background_flush, BufferConfig, PartitionWriter, StorageConfig,
};
use metadata_store::IssueStore;
use telemetry::{health, init_tracing_from_env};
use worker::{WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Path of the SQLite issue database
    #[serde(default = "default_metadata_path")]
    metadata_path: String,

    #[serde(default)]
    queue: QueueConfig,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    buffer: BufferConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_metadata_path() -> String {
    "./data/issues.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metadata_path: default_metadata_path(),
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
            buffer: BufferConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Watchtower ingest v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = ?config.queue.brokers,
        topic = %config.queue.topic,
        "Loaded queue config"
    );

    // Columnar event store + partition writer
    let store = create_object_store(&config.storage).context("Failed to create object store")?;
    let writer = Arc::new(PartitionWriter::new(store.clone(), config.buffer.clone()));
    let flush_handle = start_background_flush(writer.clone());
    health().eventstore.set_healthy();

    // Issue metadata store (runs migrations)
    if let Some(parent) = std::path::Path::new(&config.metadata_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create metadata directory")?;
    }
    let issues =
        Arc::new(IssueStore::open(&config.metadata_path).context("Failed to open issue store")?);
    health().metadata.set_healthy();

    // Queue producer + consumer
    let producer = Arc::new(Producer::new(config.queue.clone()));

    let queue_healthy = event_queue::health::check_connection(&config.queue).await;
    if queue_healthy {
        health().queue.set_healthy();
        info!("Queue connection: healthy");
    } else {
        health().queue.set_unhealthy("Connection failed");
        error!("Queue connection: unhealthy");
    }

    let consumer = Arc::new(Consumer::new(
        config.queue.consumer.clone(),
        config.queue.brokers.clone(),
        config.queue.sasl_username.clone(),
        config.queue.sasl_password.clone(),
    ));

    // Background workers
    let scheduler = Arc::new(WorkerScheduler::with_consumer(
        WorkerConfig::default(),
        store.clone(),
        writer.clone(),
        issues.clone(),
        consumer.clone(),
    ));
    let _worker_handles = scheduler.start();

    // HTTP ingress
    let state = AppState::new(producer.clone());
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Final flush so no buffered records are lost on exit.
    flush_handle.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PIPELINE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested queue config from environment
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(brokers) = std::env::var("PIPELINE_QUEUE_BROKERS") {
        config.queue.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(topic) = std::env::var("PIPELINE_QUEUE_TOPIC") {
        config.queue.consumer.topic = topic.clone();
        config.queue.topic = topic;
    }
    if let Ok(username) = std::env::var("PIPELINE_QUEUE_SASL_USERNAME") {
        config.queue.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("PIPELINE_QUEUE_SASL_PASSWORD") {
        config.queue.sasl_password = Some(password);
    }

    if let Ok(path) = std::env::var("PIPELINE_METADATA_PATH") {
        config.metadata_path = path;
    }
    if let Ok(path) = std::env::var("PIPELINE_STORAGE_PATH") {
        config.storage = StorageConfig::Local { path: path.into() };
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
