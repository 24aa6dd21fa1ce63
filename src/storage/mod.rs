//! # RillMQ Storage Module
//!
//! Append-only persistence for the broker's two durable facts: committed
//! topic metadata and produced records.
//!
//! Both files are newline-delimited JSON, append-only, never rewritten in
//! place, and replay-safe: a truncated trailing line from a crashed writer
//! is skipped on replay, not fatal.
//!
//! ## Ownership
//!
//! - the metadata WAL is written only by the control worker
//! - each data log is written only by the data worker that owns it
//!
//! No file has more than one writer; the dispatcher never touches disk.
//!
//! ## Modules
//!
//! - [`wal`] - metadata write-ahead log, the commit point for mutations
//! - [`log`] - per-worker record logs under an explicit ack policy

pub mod log;
pub mod wal;

pub use log::{DataLog, DataLogEntry};
pub use wal::MetadataWal;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, the commit timestamp resolution.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
