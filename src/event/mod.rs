//! Event Module - ordered record of a run
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: Node, callback, instance and body events
//! - `EventLog`: Thread-safe, append-only log
//! - `ExecutionListener`: Trait receiving node start/finish signals
//! - `NoopListener`: No-op listener

mod listener;
mod log;

// Re-export all public types
pub use listener::{ExecutionListener, NoopListener};
pub use log::{Event, EventKind, EventLog};
