use crate::config::AckPolicy;
use crate::protocol::{Offset, PartitionId, TopicName};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A committed produced record, one JSON line in the owning worker's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLogEntry {
    pub topic: TopicName,
    pub partition: PartitionId,
    pub offset: Offset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
    pub timestamp: u64,
    /// Connection identity of the producer.
    pub client: String,
}

/// Append-only record log for one data worker.
///
/// The ack policy names the durability guarantee: under `OnEnqueue` an
/// append returns once the line is queued in the buffered writer, under
/// `OnFlush` only after the line reached the OS.
#[derive(Debug)]
pub struct DataLog {
    path: PathBuf,
    writer: BufWriter<File>,
    ack_policy: AckPolicy,
}

impl DataLog {
    pub fn open<P: AsRef<Path>>(path: P, ack_policy: AckPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            ack_policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.ack_policy
    }

    pub fn append(&mut self, entry: &DataLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        if self.ack_policy == AckPolicy::OnFlush {
            self.writer.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Replay every well-formed entry in file order, with the same skip
    /// semantics as the metadata WAL.
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<DataLogEntry>> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DataLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("skipping malformed data log line {}: {}", lineno + 1, e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: Offset) -> DataLogEntry {
        DataLogEntry {
            topic: "orders".to_string(),
            partition: 0,
            offset,
            key: None,
            value: format!("v{}", offset),
            timestamp: 1000 + offset,
            client: "127.0.0.1:4000".to_string(),
        }
    }

    #[test]
    fn on_flush_makes_entries_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-0.log");

        let mut log = DataLog::open(&path, AckPolicy::OnFlush).unwrap();
        log.append(&entry(0)).unwrap();

        // no explicit flush: the policy already pushed the line to the OS
        let entries = DataLog::replay(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0);
    }

    #[test]
    fn on_enqueue_defers_visibility_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-0.log");

        let mut log = DataLog::open(&path, AckPolicy::OnEnqueue).unwrap();
        log.append(&entry(0)).unwrap();
        assert!(DataLog::replay(&path).unwrap().is_empty());

        log.flush().unwrap();
        assert_eq!(DataLog::replay(&path).unwrap().len(), 1);
    }

    #[test]
    fn replay_skips_junk_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-0.log");

        let mut log = DataLog::open(&path, AckPolicy::OnFlush).unwrap();
        log.append(&entry(0)).unwrap();
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"garbage\n").unwrap();

        let mut log = DataLog::open(&path, AckPolicy::OnFlush).unwrap();
        log.append(&entry(1)).unwrap();

        let entries = DataLog::replay(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].offset, 1);
    }
}
