use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub type TopicName = String;
pub type PartitionId = u32;
pub type Offset = u64;
pub type RequestId = u64;

/// Opaque key correlating asynchronous worker replies back to the client
/// session that issued the request. Assigned by the dispatcher from the
/// remote address, never supplied by the client.
pub type ConnectionId = SocketAddr;

fn default_partitions() -> u32 {
    1
}

/// A decoded client command.
///
/// The command-kind domain is closed: routing matches exhaustively on this
/// enum, and an unknown `command` tag fails decoding as malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Request {
    CreateTopic {
        topic: TopicName,
        #[serde(default = "default_partitions")]
        partitions: u32,
    },
    #[serde(rename_all = "camelCase")]
    ResizePartitions {
        topic: TopicName,
        new_partition_count: u32,
    },
    ListTopics,
    Produce {
        topic: TopicName,
        #[serde(default)]
        partition: PartitionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        value: String,
    },
}

/// One reply per request: `{"status":"success", ...}` or
/// `{"status":"error","message":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Success {
        #[serde(flatten)]
        body: ReplyBody,
    },
    Error {
        message: String,
    },
}

impl Reply {
    pub fn success(body: ReplyBody) -> Self {
        Reply::Success { body }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            message: message.into(),
        }
    }
}

/// Success payloads, flattened next to the status field on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyBody {
    /// Committed state after create-topic or resize-partitions.
    Topic { topic: TopicName, partitions: u32 },
    /// list-topics result.
    Topics { topics: Vec<TopicSummary> },
    /// Produce acknowledgment.
    Produced { offset: Offset, timestamp: u64 },
}

/// One topic as reported by list-topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub name: TopicName,
    pub partitions: u32,
    pub created_by: String,
    pub created_at: u64,
}
