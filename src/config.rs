use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// When a produced record is acknowledged relative to its log write.
///
/// The broker never fsyncs; the strongest guarantee on offer is that the
/// record reached the OS page cache before the client saw an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AckPolicy {
    /// Acknowledge once the record is queued in the buffered log writer.
    OnEnqueue,
    /// Flush the log to the OS before acknowledging.
    OnFlush,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    /// Size of the data worker pool. Produce requests are routed to a worker
    /// by a deterministic hash of (topic, partition).
    pub data_workers: usize,
    /// Deadline for a worker reply before the client sees a timeout error.
    pub request_timeout_ms: u64,
    pub ack_policy: AckPolicy,
    pub max_connections: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7092,
            data_dir: "./data".to_string(),
            data_workers: 4,
            request_timeout_ms: 10_000,
            ack_policy: AckPolicy::OnEnqueue,
            max_connections: 1024,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from RILLMQ_* environment variables.
    pub fn from_env() -> crate::Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("RILLMQ"))
            .build()
            .map_err(|e| crate::RillmqError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<BrokerConfig>()
            .map_err(|e| crate::RillmqError::Config(e.to_string()))?;

        config.validate().map_err(crate::RillmqError::Config)?;
        Ok(config)
    }

    /// Validate configuration bounds before any executor is spawned.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.data_workers == 0 {
            return Err("data_workers must be > 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be > 0".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        Ok(())
    }
}
