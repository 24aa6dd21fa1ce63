//! The dispatcher: frame, classify, route, correlate.
//!
//! One sequential executor owning the connection table, the per-connection
//! accumulation buffers, the metadata cache mirror, and the in-flight
//! request table. Workers are reachable only through channels; every reply
//! comes back as an [`Event`] and is matched to its connection by the
//! identity carried through the round-trip.

use crate::broker::control::{ControlCommand, ControlReply, MetadataAction};
use crate::broker::data::{ProduceCommand, ProduceReply};
use crate::metadata::MetadataCache;
use crate::metrics::MetricsRegistry;
use crate::protocol::{
    ConnectionId, PartitionId, RecordCodec, Reply, ReplyBody, Request, RequestId, TopicSummary,
};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

/// How often the in-flight table is swept for expired deadlines.
const DEADLINE_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the dispatcher reacts to: connection lifecycle and raw bytes
/// from the reader tasks, completions from the workers.
#[derive(Debug)]
pub enum Event {
    ConnectionOpened {
        id: ConnectionId,
        outbound: mpsc::UnboundedSender<Bytes>,
    },
    InboundData {
        id: ConnectionId,
        bytes: Bytes,
    },
    ConnectionClosed {
        id: ConnectionId,
    },
    ControlDone(ControlReply),
    ProduceDone(ProduceReply),
}

/// An open stream session, owned exclusively by the dispatcher.
#[derive(Debug)]
struct Connection {
    /// Partially received records accumulate here until a delimiter lands.
    buffer: BytesMut,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Bookkeeping for a request handed to a worker.
#[derive(Debug)]
struct PendingRequest {
    connection: ConnectionId,
    deadline: Instant,
}

pub struct Dispatcher {
    mirror: MetadataCache,
    connections: HashMap<ConnectionId, Connection>,
    pending: HashMap<RequestId, PendingRequest>,
    next_request_id: RequestId,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    data_txs: Vec<mpsc::UnboundedSender<ProduceCommand>>,
    request_timeout: Duration,
    metrics: Arc<MetricsRegistry>,
    codec: RecordCodec,
}

impl Dispatcher {
    pub fn new(
        mirror: MetadataCache,
        control_tx: mpsc::UnboundedSender<ControlCommand>,
        data_txs: Vec<mpsc::UnboundedSender<ProduceCommand>>,
        request_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            mirror,
            connections: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: 0,
            control_tx,
            data_txs,
            request_timeout,
            metrics,
            codec: RecordCodec,
        }
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut sweep = tokio::time::interval(DEADLINE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = sweep.tick() => self.expire_deadlines(Instant::now()),
                _ = shutdown.recv() => {
                    info!("dispatcher shutting down, {:?}", self.metrics.snapshot());
                    break;
                }
            }
        }
        debug!("dispatcher stopped");
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::ConnectionOpened { id, outbound } => {
                self.metrics.connection_opened();
                debug!(connection = %id, "connection registered");
                self.connections.insert(
                    id,
                    Connection {
                        buffer: BytesMut::new(),
                        outbound,
                    },
                );
            }
            Event::ConnectionClosed { id } => {
                // in-flight entries for this connection stay until their
                // reply or deadline resolves them; the reply is then
                // discarded as orphaned
                if self.connections.remove(&id).is_some() {
                    self.metrics.connection_closed();
                    debug!(connection = %id, "connection removed");
                }
            }
            Event::InboundData { id, bytes } => self.on_data(id, bytes),
            Event::ControlDone(reply) => self.on_control_reply(reply),
            Event::ProduceDone(reply) => self.on_produce_reply(reply),
        }
    }

    /// Append bytes to the connection's buffer and drain every complete
    /// record currently framed.
    fn on_data(&mut self, id: ConnectionId, bytes: Bytes) {
        let Some(conn) = self.connections.get_mut(&id) else {
            warn!(connection = %id, "data for unknown connection");
            return;
        };
        conn.buffer.extend_from_slice(&bytes);

        // the buffer moves out while records are routed, then back in; a
        // record can never remove its own connection
        let mut buffer = std::mem::take(&mut conn.buffer);
        let mut codec = self.codec;
        loop {
            match codec.decode(&mut buffer) {
                Ok(Some(frame)) => self.on_record(id, frame),
                Ok(None) => break,
                Err(e) => {
                    self.metrics.error_occurred();
                    self.reply(id, &Reply::error(format!("framing error: {}", e)));
                    buffer.clear();
                    break;
                }
            }
        }
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.buffer = buffer;
        }
    }

    /// Decode one framed record. A decode failure is reported for that
    /// record alone; the connection stays open.
    fn on_record(&mut self, id: ConnectionId, frame: Bytes) {
        self.metrics.request_received();
        match serde_json::from_slice::<Request>(&frame) {
            Ok(request) => self.route(id, request),
            Err(e) => {
                self.metrics.error_occurred();
                self.reply(id, &Reply::error(format!("malformed request: {}", e)));
            }
        }
    }

    /// Classification is pure and total over the command-kind domain.
    fn route(&mut self, id: ConnectionId, request: Request) {
        match request {
            // fast path: answered from the mirror, nothing leaves the
            // dispatcher
            Request::ListTopics => {
                let topics: Vec<TopicSummary> =
                    self.mirror.list().iter().map(TopicSummary::from).collect();
                self.reply(id, &Reply::success(ReplyBody::Topics { topics }));
            }
            Request::CreateTopic { topic, partitions } => {
                self.forward_control(id, MetadataAction::Create { topic, partitions });
            }
            Request::ResizePartitions {
                topic,
                new_partition_count,
            } => {
                self.forward_control(
                    id,
                    MetadataAction::Resize {
                        topic,
                        new_partition_count,
                    },
                );
            }
            Request::Produce {
                topic,
                partition,
                key,
                value,
            } => self.route_produce(id, topic, partition, key, value),
        }
    }

    /// All validation is the control worker's; the dispatcher only tracks
    /// the in-flight request.
    fn forward_control(&mut self, id: ConnectionId, action: MetadataAction) {
        let request_id = self.track(id);
        let cmd = ControlCommand {
            request_id,
            connection: id,
            action,
        };
        if self.control_tx.send(cmd).is_err() {
            self.pending.remove(&request_id);
            self.metrics.error_occurred();
            self.reply(id, &Reply::error("control worker unavailable"));
        }
    }

    fn route_produce(
        &mut self,
        id: ConnectionId,
        topic: String,
        partition: PartitionId,
        key: Option<String>,
        value: String,
    ) {
        // fail fast from the mirror, no worker round-trip
        let Some(record) = self.mirror.get(&topic) else {
            self.metrics.error_occurred();
            self.reply(id, &Reply::error(format!("unknown topic '{}'", topic)));
            return;
        };
        if partition >= record.partitions {
            self.metrics.error_occurred();
            self.reply(
                id,
                &Reply::error(format!(
                    "partition {} out of range for topic '{}' with {} partitions",
                    partition, topic, record.partitions
                )),
            );
            return;
        }

        let worker = partition_worker(&topic, partition, self.data_txs.len());
        let request_id = self.track(id);
        let cmd = ProduceCommand {
            request_id,
            connection: id,
            topic,
            partition,
            key,
            value,
        };
        if self.data_txs[worker].send(cmd).is_err() {
            self.pending.remove(&request_id);
            self.metrics.error_occurred();
            self.reply(id, &Reply::error(format!("data worker {} unavailable", worker)));
        }
    }

    fn track(&mut self, connection: ConnectionId) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(
            request_id,
            PendingRequest {
                connection,
                deadline: Instant::now() + self.request_timeout,
            },
        );
        request_id
    }

    fn on_control_reply(&mut self, reply: ControlReply) {
        // the commit already happened; the mirror must reflect it even when
        // nobody is waiting for the reply anymore
        if let Ok(record) = &reply.result {
            self.mirror.apply(record.clone());
        }

        let Some(pending) = self.pending.remove(&reply.request_id) else {
            debug!(request_id = reply.request_id, "discarding reply for expired request");
            return;
        };
        let message = match reply.result {
            Ok(record) => Reply::success(ReplyBody::Topic {
                topic: record.name,
                partitions: record.partitions,
            }),
            Err(e) => {
                self.metrics.error_occurred();
                Reply::error(e.to_string())
            }
        };
        self.reply(pending.connection, &message);
    }

    fn on_produce_reply(&mut self, reply: ProduceReply) {
        let Some(pending) = self.pending.remove(&reply.request_id) else {
            debug!(request_id = reply.request_id, "discarding reply for expired request");
            return;
        };
        let message = match reply.result {
            Ok(ack) => {
                self.metrics.record_produced();
                Reply::success(ReplyBody::Produced {
                    offset: ack.offset,
                    timestamp: ack.timestamp,
                })
            }
            Err(e) => {
                self.metrics.error_occurred();
                Reply::error(e.to_string())
            }
        };
        self.reply(pending.connection, &message);
    }

    /// Write a reply to the connection that issued the request. Replies for
    /// a connection that is gone are logged and discarded, never buffered
    /// for reconnection.
    fn reply(&mut self, id: ConnectionId, reply: &Reply) {
        let Some(conn) = self.connections.get(&id) else {
            warn!(connection = %id, "dropping reply for closed connection");
            return;
        };
        let payload = match serde_json::to_vec(reply) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!(connection = %id, "failed to encode reply: {}", e);
                return;
            }
        };
        if conn.outbound.send(payload).is_err() {
            warn!(connection = %id, "connection writer gone before reply could be sent");
        }
    }

    /// Expire in-flight requests past their deadline with a visible timeout
    /// error, so a crashed worker cannot stall a connection silently.
    pub fn expire_deadlines(&mut self, now: Instant) {
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(request_id, _)| *request_id)
            .collect();
        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                warn!(request_id, connection = %pending.connection, "request timed out");
                self.metrics.error_occurred();
                self.reply(pending.connection, &Reply::error("request timed out"));
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn mirror(&self) -> &MetadataCache {
        &self.mirror
    }
}

/// Deterministic worker choice for a (topic, partition) pair, so exactly
/// one worker assigns offsets for any given partition.
pub fn partition_worker(topic: &str, partition: PartitionId, workers: usize) -> usize {
    // FNV-1a over the topic name and the partition id
    let mut hash: u32 = 2166136261;
    for byte in topic.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    for byte in partition.to_be_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash as usize % workers
}
