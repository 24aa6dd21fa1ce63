//! # RillMQ Wire Protocol
//!
//! Requests and replies travel over a persistent TCP stream as one JSON
//! record per line, terminated by a single newline. There is no binary
//! framing or length prefixing; a record is a mapping of named fields.
//!
//! ## Modules
//!
//! - [`messages`] - request/reply definitions and shared type aliases
//! - [`codec`] - the newline-delimited record codec

pub mod codec;
pub mod messages;

pub use codec::RecordCodec;
pub use messages::*;
