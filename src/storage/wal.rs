use crate::metadata::TopicRecord;
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only metadata write-ahead log, one JSON record per line.
///
/// The append is the commit point for metadata mutations: a record is
/// written and flushed before it is reflected in any cache and before any
/// reply is sent.
#[derive(Debug)]
pub struct MetadataWal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetadataWal {
    /// Open the WAL for appending, creating the file and its parent
    /// directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one committed record; returns only after the line reached the
    /// OS.
    pub fn append(&mut self, record: &TopicRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Replay every well-formed record in file order.
    ///
    /// A missing file is an empty history. Malformed lines, including a
    /// truncated trailing line from a crashed writer, are skipped with a
    /// warning; replay never aborts startup.
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<TopicRecord>> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TopicRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed WAL line {}: {}", lineno + 1, e),
            }
        }
        Ok(records)
    }
}
