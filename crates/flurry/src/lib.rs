//! Flurry: adaptive batching for destination plugins.
//!
//! A sync produces a stream of [`Message`]s: schema migrations, Arrow record
//! inserts, stale-row deletions and keyed deletions. The writers in this crate
//! turn that stream into bounded batches and hand each one to a destination
//! client.
//!
//! This crate handles:
//! - Measuring batches against a byte and row budget ([`Cap`])
//! - Splitting oversized records into budget-sized pieces ([`split_record`])
//! - Batching per table and per kind, with idle flushing and kind ordering
//! - Delivering batches through three client contracts: whole batches
//!   ([`BatchWriter`]), one batch per kind across tables ([`MixedBatchWriter`])
//!   and channel-fed streams ([`StreamingBatchWriter`])

pub mod cap;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod record;
pub mod slicer;
mod worker;
pub mod writer;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use cap::Cap;
pub use client::{BatchClient, BoxError, MixedBatchClient, StreamingClient};
pub use config::WriterConfig;
pub use error::WriterError;
pub use message::{
    Batchable, DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable,
    TableRelation,
};
pub use slicer::{Split, split_record};
pub use writer::{BatchWriter, MixedBatchWriter, StreamingBatchWriter};

// Re-export from flurry-core
pub use flurry_core::{KB, MB, init_tracing};
