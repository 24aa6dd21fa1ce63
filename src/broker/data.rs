//! The data worker pool: append produced records, assign offsets.
//!
//! Each worker is a fully independent sequential executor over its own log;
//! no cross-worker coordination exists. The dispatcher routes every
//! (topic, partition) pair to a fixed worker, so the per-partition offset
//! counters here are the single authority for those partitions.

use crate::broker::dispatcher::Event;
use crate::config::AckPolicy;
use crate::protocol::{ConnectionId, Offset, PartitionId, RequestId, TopicName};
use crate::storage::{now_millis, DataLog, DataLogEntry};
use crate::{Result, RillmqError};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A produce request already vetted against the dispatcher's mirror.
#[derive(Debug)]
pub struct ProduceCommand {
    pub request_id: RequestId,
    pub connection: ConnectionId,
    pub topic: TopicName,
    pub partition: PartitionId,
    pub key: Option<String>,
    pub value: String,
}

#[derive(Debug)]
pub struct ProduceReply {
    pub request_id: RequestId,
    pub connection: ConnectionId,
    pub result: std::result::Result<ProduceAck, RillmqError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    pub offset: Offset,
    pub timestamp: u64,
}

pub struct DataWorker {
    id: usize,
    log: DataLog,
    /// Next offset per partition this worker has written. Strictly
    /// increasing, gap-free, starting at zero for a fresh log.
    next_offsets: HashMap<(TopicName, PartitionId), Offset>,
}

impl DataWorker {
    /// Open the worker's log, replaying it to seed the offset counters so
    /// offsets continue across restarts instead of resetting to zero.
    pub fn open<P: AsRef<Path>>(id: usize, path: P, ack_policy: AckPolicy) -> Result<Self> {
        let mut next_offsets: HashMap<(TopicName, PartitionId), Offset> = HashMap::new();
        for entry in DataLog::replay(&path)? {
            let next = next_offsets
                .entry((entry.topic.clone(), entry.partition))
                .or_insert(0);
            if entry.offset >= *next {
                *next = entry.offset + 1;
            }
        }
        if !next_offsets.is_empty() {
            debug!(worker = id, partitions = next_offsets.len(), "data log replayed");
        }
        let log = DataLog::open(path, ack_policy)?;
        Ok(Self {
            id,
            log,
            next_offsets,
        })
    }

    pub fn handle(&mut self, cmd: ProduceCommand) -> ProduceReply {
        let result = self.produce(
            cmd.topic,
            cmd.partition,
            cmd.key,
            cmd.value,
            cmd.connection.to_string(),
        );
        ProduceReply {
            request_id: cmd.request_id,
            connection: cmd.connection,
            result,
        }
    }

    fn produce(
        &mut self,
        topic: TopicName,
        partition: PartitionId,
        key: Option<String>,
        value: String,
        client: String,
    ) -> std::result::Result<ProduceAck, RillmqError> {
        let next = self
            .next_offsets
            .entry((topic.clone(), partition))
            .or_insert(0);
        let offset = *next;
        let timestamp = now_millis();

        let entry = DataLogEntry {
            topic,
            partition,
            offset,
            key,
            value,
            timestamp,
            client,
        };
        self.log.append(&entry)?;

        // the counter advances only once the append was accepted, so a
        // failed write leaves no gap
        *next = offset + 1;
        Ok(ProduceAck { offset, timestamp })
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ProduceCommand>,
        events: mpsc::UnboundedSender<Event>,
    ) {
        while let Some(cmd) = commands.recv().await {
            let reply = self.handle(cmd);
            if events.send(Event::ProduceDone(reply)).is_err() {
                break;
            }
        }
        if let Err(e) = self.log.flush() {
            warn!(worker = self.id, "failed to flush data log on shutdown: {}", e);
        }
        debug!(worker = self.id, "data worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> ConnectionId {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn produce(topic: &str, partition: PartitionId, value: &str) -> ProduceCommand {
        ProduceCommand {
            request_id: 1,
            connection: addr(),
            topic: topic.to_string(),
            partition,
            key: None,
            value: value.to_string(),
        }
    }

    #[test]
    fn offsets_are_contiguous_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker =
            DataWorker::open(0, dir.path().join("records-0.log"), AckPolicy::OnFlush).unwrap();

        for expected in 0..5u64 {
            let ack = worker
                .handle(produce("orders", 0, "payload"))
                .result
                .unwrap();
            assert_eq!(ack.offset, expected);
        }
    }

    #[test]
    fn partitions_have_independent_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker =
            DataWorker::open(0, dir.path().join("records-0.log"), AckPolicy::OnFlush).unwrap();

        assert_eq!(worker.handle(produce("orders", 0, "a")).result.unwrap().offset, 0);
        assert_eq!(worker.handle(produce("orders", 1, "b")).result.unwrap().offset, 0);
        assert_eq!(worker.handle(produce("billing", 0, "c")).result.unwrap().offset, 0);
        assert_eq!(worker.handle(produce("orders", 0, "d")).result.unwrap().offset, 1);
    }

    #[test]
    fn restart_resumes_offsets_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-0.log");

        {
            let mut worker = DataWorker::open(0, &path, AckPolicy::OnFlush).unwrap();
            for _ in 0..3 {
                worker.handle(produce("orders", 7, "x")).result.unwrap();
            }
        }

        let mut worker = DataWorker::open(0, &path, AckPolicy::OnFlush).unwrap();
        let ack = worker.handle(produce("orders", 7, "y")).result.unwrap();
        assert_eq!(ack.offset, 3);
    }

    #[test]
    fn appended_entries_carry_the_producer_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-0.log");

        let mut worker = DataWorker::open(0, &path, AckPolicy::OnFlush).unwrap();
        worker.handle(produce("orders", 0, "payload")).result.unwrap();

        let entries = DataLog::replay(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].client, addr().to_string());
        assert_eq!(entries[0].value, "payload");
    }
}
