#![allow(dead_code)]

use rillmq::{AckPolicy, BrokerConfig, BrokerServer};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

/// Start a broker on an ephemeral port with its state under `data_dir`.
pub async fn start_broker(data_dir: &Path) -> (SocketAddr, broadcast::Sender<()>) {
    start_broker_with(data_dir, AckPolicy::OnFlush).await
}

pub async fn start_broker_with(
    data_dir: &Path,
    ack_policy: AckPolicy,
) -> (SocketAddr, broadcast::Sender<()>) {
    let config = BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: data_dir.to_string_lossy().into_owned(),
        data_workers: 2,
        request_timeout_ms: 5_000,
        ack_policy,
        max_connections: 64,
    };
    let server = BrokerServer::bind(config)
        .await
        .expect("failed to bind broker");
    let addr = server.local_addr().expect("listener address");
    let shutdown = server.shutdown_signal();
    tokio::spawn(server.run());
    (addr, shutdown)
}

/// Line-oriented test client speaking the JSON wire protocol.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("failed to connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("write request");
        self.writer.write_all(b"\n").await.expect("write delimiter");
    }

    /// Send one request and wait for its reply.
    pub async fn request(&mut self, body: &Value) -> Value {
        self.send_raw(&body.to_string()).await;
        self.recv().await
    }

    pub async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read reply")
            .expect("connection closed before reply");
        serde_json::from_str(&line).expect("reply must be valid JSON")
    }
}
