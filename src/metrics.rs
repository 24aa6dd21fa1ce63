//! Lock-free broker counters.
//!
//! Atomic counters with relaxed ordering, updated on the dispatcher's hot
//! path and read by the accept loop for the connection-capacity check.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    requests_received: AtomicU64,
    records_produced: AtomicU64,
    errors: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_produced(&self) {
        self.records_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_occurred(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        opened.saturating_sub(closed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            records_produced: self.records_produced.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the registry, safe to log or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub requests_received: u64,
    pub records_produced: u64,
    pub errors: u64,
}
