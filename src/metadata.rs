//! Topic metadata records and the derived in-memory cache.
//!
//! A [`TopicRecord`] is the persisted fact describing a topic's current
//! state; each create or resize commit appends a new record to the metadata
//! WAL. A [`MetadataCache`] is the mapping from topic name to the latest
//! record for that name, rebuilt by sequential WAL replay at startup.
//!
//! Two cache instances exist at runtime: the control worker's authoritative
//! copy, mutated only by successful WAL commits, and the dispatcher's
//! read-only mirror, updated only after the control worker confirms a
//! commit.

use crate::protocol::{TopicName, TopicSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted fact describing a topic's current state.
///
/// A resize appends a full snapshot: the original creator and creation
/// timestamp are carried forward, only the partition count moves. Replay
/// order defines the final state, last write wins per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRecord {
    pub name: TopicName,
    pub partitions: u32,
    pub created_by: String,
    pub created_at: u64,
}

impl From<&TopicRecord> for TopicSummary {
    fn from(record: &TopicRecord) -> Self {
        TopicSummary {
            name: record.name.clone(),
            partitions: record.partitions,
            created_by: record.created_by.clone(),
            created_at: record.created_at,
        }
    }
}

/// Derived mapping from topic name to its latest committed record.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    topics: BTreeMap<TopicName, TopicRecord>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a cache by applying records in replay order.
    pub fn from_records(records: impl IntoIterator<Item = TopicRecord>) -> Self {
        let mut cache = Self::new();
        for record in records {
            cache.apply(record);
        }
        cache
    }

    /// Idempotently merge a committed record, last write wins.
    pub fn apply(&mut self, record: TopicRecord) {
        self.topics.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&TopicRecord> {
        self.topics.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// All known topics in name order.
    pub fn list(&self) -> Vec<TopicRecord> {
        self.topics.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
