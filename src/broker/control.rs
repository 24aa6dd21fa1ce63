//! The control worker: sole writer of topic metadata.
//!
//! At most one metadata mutation is validated and committed at a time; the
//! worker processes each command to completion, which gives mutations a
//! total order equal to WAL append order.

use crate::broker::dispatcher::Event;
use crate::metadata::{MetadataCache, TopicRecord};
use crate::protocol::{ConnectionId, RequestId, TopicName};
use crate::storage::{now_millis, MetadataWal};
use crate::{Result, RillmqError};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A metadata mutation forwarded by the dispatcher, tagged with the
/// originating connection for reply correlation.
#[derive(Debug)]
pub struct ControlCommand {
    pub request_id: RequestId,
    pub connection: ConnectionId,
    pub action: MetadataAction,
}

#[derive(Debug)]
pub enum MetadataAction {
    Create {
        topic: TopicName,
        partitions: u32,
    },
    Resize {
        topic: TopicName,
        new_partition_count: u32,
    },
}

/// Outcome of one command; on success carries the committed record so the
/// dispatcher can update its mirror before replying.
#[derive(Debug)]
pub struct ControlReply {
    pub request_id: RequestId,
    pub connection: ConnectionId,
    pub result: std::result::Result<TopicRecord, RillmqError>,
}

/// Commands rejected before anything is appended. Never fatal to the
/// worker, never partially applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("topic '{0}' already exists")]
    TopicExists(TopicName),

    #[error("unknown topic '{0}'")]
    UnknownTopic(TopicName),

    #[error("partition count must be a positive integer, got {0}")]
    InvalidPartitionCount(u32),

    #[error("new partition count {requested} must be greater than current {current}")]
    NonIncreasingResize { requested: u32, current: u32 },
}

/// Lifecycle of the metadata writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    Initializing,
    Ready,
    Validating,
    Committing,
}

pub struct ControlWorker {
    wal: MetadataWal,
    cache: MetadataCache,
    state: ControlState,
}

impl ControlWorker {
    /// Replay the WAL and open it for appending.
    ///
    /// Returns the worker plus a snapshot of the replayed cache for seeding
    /// the dispatcher's mirror, so both caches start from the same history.
    pub fn open<P: AsRef<Path>>(wal_path: P) -> Result<(Self, MetadataCache)> {
        let wal = MetadataWal::open(&wal_path)?;
        let mut worker = Self {
            wal,
            cache: MetadataCache::new(),
            state: ControlState::Initializing,
        };

        debug!("control worker initializing, replaying metadata WAL");
        for record in MetadataWal::replay(&wal_path)? {
            worker.cache.apply(record);
        }
        info!(topics = worker.cache.len(), "metadata WAL replayed");
        worker.state = ControlState::Ready;

        let snapshot = worker.cache.clone();
        Ok((worker, snapshot))
    }

    /// Process one command to completion, no interleaving.
    pub fn handle(&mut self, cmd: ControlCommand) -> ControlReply {
        debug_assert_eq!(self.state, ControlState::Ready);
        self.state = ControlState::Validating;
        let creator = cmd.connection.to_string();
        let result = match cmd.action {
            MetadataAction::Create { topic, partitions } => {
                self.create_topic(topic, partitions, creator)
            }
            MetadataAction::Resize {
                topic,
                new_partition_count,
            } => self.resize_partitions(topic, new_partition_count),
        };
        self.state = ControlState::Ready;
        ControlReply {
            request_id: cmd.request_id,
            connection: cmd.connection,
            result,
        }
    }

    fn create_topic(
        &mut self,
        topic: TopicName,
        partitions: u32,
        creator: String,
    ) -> Result<TopicRecord> {
        if self.cache.exists(&topic) {
            return Err(ValidationError::TopicExists(topic).into());
        }
        if partitions == 0 {
            return Err(ValidationError::InvalidPartitionCount(partitions).into());
        }
        let record = TopicRecord {
            name: topic,
            partitions,
            created_by: creator,
            created_at: now_millis(),
        };
        self.commit(record)
    }

    fn resize_partitions(&mut self, topic: TopicName, new_partition_count: u32) -> Result<TopicRecord> {
        let Some(current) = self.cache.get(&topic) else {
            return Err(ValidationError::UnknownTopic(topic).into());
        };
        if new_partition_count <= current.partitions {
            return Err(ValidationError::NonIncreasingResize {
                requested: new_partition_count,
                current: current.partitions,
            }
            .into());
        }
        // a resize record is a full snapshot: creator and creation time are
        // carried forward, only the count moves
        let record = TopicRecord {
            partitions: new_partition_count,
            ..current.clone()
        };
        self.commit(record)
    }

    /// The WAL append is the commit point: durable before the cache sees
    /// the record and before any reply is sent.
    fn commit(&mut self, record: TopicRecord) -> Result<TopicRecord> {
        self.state = ControlState::Committing;
        self.wal.append(&record)?;
        self.cache.apply(record.clone());
        info!(
            topic = %record.name,
            partitions = record.partitions,
            "metadata record committed"
        );
        Ok(record)
    }

    #[cfg(test)]
    fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
        events: mpsc::UnboundedSender<Event>,
    ) {
        while let Some(cmd) = commands.recv().await {
            let reply = self.handle(cmd);
            if events.send(Event::ControlDone(reply)).is_err() {
                break;
            }
        }
        debug!("control worker stopped");
    }
}
