//! # RillMQ Broker Runtime
//!
//! The concurrent broker core: a single dispatcher plus isolated worker
//! executors, conceptually N+2 sequential processes with no shared mutable
//! memory, communicating exclusively over channels.
//!
//! ## Components
//!
//! - [`server`] - TCP listener, connection reader/writer tasks, executor
//!   spawning, graceful shutdown
//! - [`dispatcher`] - frames incoming byte streams, classifies and routes
//!   requests, correlates worker replies with connections, enforces
//!   per-request deadlines
//! - [`control`] - the single writer of topic metadata and its WAL
//! - [`data`] - the data worker pool appending produced records
//!
//! ## Ordering guarantees
//!
//! Within the control worker, mutation order equals WAL append order.
//! Within one data worker, offset assignment order equals log append order.
//! Cross-kind reply ordering to a single connection is not guaranteed: a
//! later-arriving read served from the dispatcher's mirror may complete
//! before an earlier-arriving write still in flight to a worker.

pub mod control;
pub mod data;
pub mod dispatcher;
pub mod server;

pub use control::{ControlWorker, ValidationError};
pub use data::DataWorker;
pub use dispatcher::Dispatcher;
pub use server::BrokerServer;
