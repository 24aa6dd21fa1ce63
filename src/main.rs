use clap::Parser;
use rillmq::{AckPolicy, BrokerConfig, BrokerServer, Result};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rillmq")]
#[command(about = "A minimal message broker with a strict control/data-plane split")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value = "7092")]
    port: u16,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Number of data workers appending produced records
    #[arg(long, default_value = "4")]
    data_workers: usize,

    /// Deadline for a worker reply before the client sees a timeout error
    #[arg(long, default_value = "10000")]
    request_timeout_ms: u64,

    /// When a produced record is acknowledged relative to its log write
    #[arg(long, value_enum, default_value = "on-enqueue")]
    ack_policy: AckPolicy,

    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Load configuration from RILLMQ_* environment variables instead of flags
    #[arg(long)]
    from_env: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(&args.log_level))
        .init();

    let config = if args.from_env {
        BrokerConfig::from_env()?
    } else {
        BrokerConfig {
            host: args.host,
            port: args.port,
            data_dir: args.data_dir,
            data_workers: args.data_workers,
            request_timeout_ms: args.request_timeout_ms,
            ack_policy: args.ack_policy,
            max_connections: args.max_connections,
        }
    };

    info!("Starting rillmq broker on {}:{}", config.host, config.port);
    info!("Data directory: {}", config.data_dir);
    info!("Data workers: {}", config.data_workers);
    info!("Ack policy: {:?}", config.ack_policy);
    info!("Request timeout: {}ms", config.request_timeout_ms);

    let server = BrokerServer::bind(config).await?;
    let shutdown = server.shutdown_signal();

    // Spawn the server task
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    // Set up signal handlers
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown.send(());
        }
        _ = server_handle => {
            info!("Server task completed");
        }
    }

    info!("rillmq shut down successfully");
    Ok(())
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            warn!("Invalid log level '{}', defaulting to 'info'", level);
            tracing::Level::INFO
        }
    }
}
