//! TCP front end: listener, per-connection reader/writer tasks, and wiring
//! for the dispatcher and worker executors.

use crate::broker::control::ControlWorker;
use crate::broker::data::DataWorker;
use crate::broker::dispatcher::{Dispatcher, Event};
use crate::config::BrokerConfig;
use crate::metrics::MetricsRegistry;
use crate::protocol::{ConnectionId, RecordCodec};
use crate::{Result, RillmqError};
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, warn};

pub struct BrokerServer {
    config: BrokerConfig,
    listener: TcpListener,
    events: mpsc::UnboundedSender<Event>,
    shutdown_tx: broadcast::Sender<()>,
    metrics: Arc<MetricsRegistry>,
}

impl BrokerServer {
    /// Bind the listener, replay persisted state, and spawn the control
    /// worker, the data worker pool, and the dispatcher.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        config.validate().map_err(RillmqError::Config)?;

        let data_dir = PathBuf::from(&config.data_dir);
        let metrics = Arc::new(MetricsRegistry::new());
        let (shutdown_tx, _) = broadcast::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // the WAL replay seeds both the authoritative cache and the
        // dispatcher's mirror before any traffic arrives
        let (control, mirror) = ControlWorker::open(data_dir.join("metadata.wal"))?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(control.run(control_rx, events_tx.clone()));

        let mut data_txs = Vec::with_capacity(config.data_workers);
        for worker_id in 0..config.data_workers {
            let worker = DataWorker::open(
                worker_id,
                data_dir.join(format!("records-{}.log", worker_id)),
                config.ack_policy,
            )?;
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(worker.run(rx, events_tx.clone()));
            data_txs.push(tx);
        }

        let dispatcher = Dispatcher::new(
            mirror,
            control_tx,
            data_txs,
            Duration::from_millis(config.request_timeout_ms),
            Arc::clone(&metrics),
        );
        tokio::spawn(dispatcher.run(events_rx, shutdown_tx.subscribe()));

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("rillmq broker listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            events: events_tx,
            shutdown_tx,
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Handle for signalling graceful shutdown from outside the accept
    /// loop.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept loop; runs until shutdown is signalled.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            if self.metrics.active_connections() >= self.config.max_connections as u64 {
                                warn!("connection table full, dropping {}", peer_addr);
                                continue;
                            }
                            if let Err(e) = Self::tune_client_socket(&stream) {
                                warn!("failed to tune client socket {}: {}", peer_addr, e);
                            }
                            debug!("client connected: {}", peer_addr);
                            Self::spawn_connection(stream, peer_addr, self.events.clone());
                        }
                        Err(e) => {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down accept loop");
                    break;
                }
            }
        }
        Ok(())
    }

    fn tune_client_socket(stream: &TcpStream) -> std::io::Result<()> {
        use socket2::SockRef;

        let socket_ref = SockRef::from(stream);
        socket_ref.set_nodelay(true)?;
        socket_ref.set_keepalive(true)?;
        Ok(())
    }

    /// One reader and one writer task per connection.
    ///
    /// The reader forwards raw chunks; framing happens in the dispatcher,
    /// which owns the accumulation buffer keyed by the connection identity.
    /// The writer drains the dispatcher's outbound channel through the
    /// record codec.
    fn spawn_connection(
        stream: TcpStream,
        peer_addr: ConnectionId,
        events: mpsc::UnboundedSender<Event>,
    ) {
        let (mut read_half, write_half) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();

        if events
            .send(Event::ConnectionOpened {
                id: peer_addr,
                outbound: outbound_tx,
            })
            .is_err()
        {
            warn!("dispatcher gone, dropping connection {}", peer_addr);
            return;
        }

        tokio::spawn(async move {
            let mut sink = FramedWrite::new(write_half, RecordCodec);
            while let Some(payload) = outbound_rx.recv().await {
                if let Err(e) = sink.send(payload).await {
                    debug!("write to {} failed: {}", peer_addr, e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut buf = BytesMut::with_capacity(8 * 1024);
            loop {
                match read_half.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let chunk = buf.split().freeze();
                        if events
                            .send(Event::InboundData {
                                id: peer_addr,
                                bytes: chunk,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("read from {} failed: {}", peer_addr, e);
                        break;
                    }
                }
            }
            let _ = events.send(Event::ConnectionClosed { id: peer_addr });
            debug!("client disconnected: {}", peer_addr);
        });
    }
}
