//! Durable storage for a simulation's event history and periodic checkpoints.
//!
//! - [`event_log`]: append-only NDJSON event log with `fsync`-on-write
//!   durability and an in-memory time index rebuilt on open.
//! - [`checkpoint`]: `bincode` + BLAKE3 checkpoint store used to rewind
//!   without replaying the entire event history from the start.

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod event_log;

pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
    pub use crate::event_log::{EventLog, EventLogError};
}
