//! # RillMQ Core Library
//!
//! RillMQ is a minimal message broker with a strict control/data-plane split.
//! Clients connect over TCP and issue administrative commands (create topic,
//! resize partitions, list topics) or data commands (produce a record), framed
//! as one JSON record per line.
//!
//! ## Architecture Overview
//!
//! The broker runtime is a set of sequential executors that own their state
//! exclusively and communicate only through asynchronous message passing:
//!
//! - [`broker::Dispatcher`] - accepts decoded requests, routes them, and
//!   correlates worker replies back to the originating connection
//! - [`broker::ControlWorker`] - the single writer of topic metadata, backed
//!   by a write-ahead log that is replayed at startup
//! - [`broker::DataWorker`] - pool members that append produced records to
//!   their own logs and assign per-partition offsets
//! - [`metadata::MetadataCache`] - the derived topic view; the control worker
//!   holds the authoritative copy and the dispatcher a read-only mirror
//!
//! Read-only metadata queries are answered from the dispatcher's mirror
//! without contacting any worker. Metadata mutations are committed to the WAL
//! before they are visible anywhere. Produce requests are routed by a
//! deterministic function of (topic, partition) so exactly one worker assigns
//! offsets for any partition.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rillmq::{BrokerConfig, BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig {
//!         port: 7092,
//!         host: "0.0.0.0".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let server = BrokerServer::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod metadata;
pub mod metrics;
pub mod protocol;
pub mod storage;

pub use broker::{BrokerServer, ControlWorker, DataWorker, Dispatcher, ValidationError};
pub use config::{AckPolicy, BrokerConfig};
pub use metadata::{MetadataCache, TopicRecord};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use protocol::{
    ConnectionId, Offset, PartitionId, RecordCodec, Reply, ReplyBody, Request, TopicName,
    TopicSummary,
};

use thiserror::Error;

/// RillMQ error types
///
/// # Error Categories
///
/// - **Storage Errors**: file I/O on the metadata WAL and data logs
/// - **JSON Errors**: wire record and persisted record encode/decode failures
/// - **Configuration**: invalid configuration parameters
/// - **Validation**: metadata commands rejected by the control worker
#[derive(Debug, Error)]
pub enum RillmqError {
    /// Storage subsystem errors including file and socket I/O failures
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON parsing and serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata commands rejected by the control worker
    #[error("Validation error: {0}")]
    Validation(#[from] broker::ValidationError),
}

/// Result type alias used throughout the RillMQ codebase.
pub type Result<T> = std::result::Result<T, RillmqError>;
