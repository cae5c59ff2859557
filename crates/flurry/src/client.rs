//! Contracts a destination implements to receive batches.
//!
//! Three shapes are supported, each driven by its own writer:
//!
//! - [`BatchClient`]: one call per completed batch, inserts grouped by table
//! - [`MixedBatchClient`]: one call per completed batch of a kind, across all tables
//! - [`StreamingClient`]: one call per batch, fed through a channel that closes
//!   when the batch is complete
//!
//! Retries and backoff are the client's business. Any error returned here ends
//! the writer's `write` call.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{DeleteRecord, DeleteStale, Insert, MigrateTable};

/// Error type returned by destination clients.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A destination that takes whole batches, inserts grouped per table.
#[async_trait]
pub trait BatchClient: Send + Sync + 'static {
    async fn migrate_tables(&self, messages: Vec<MigrateTable>) -> Result<(), BoxError>;

    /// Write one batch of inserts, all addressed to `table`.
    async fn write_table_batch(&self, table: &str, messages: Vec<Insert>)
    -> Result<(), BoxError>;

    async fn delete_stale(&self, messages: Vec<DeleteStale>) -> Result<(), BoxError>;

    async fn delete_records(&self, messages: Vec<DeleteRecord>) -> Result<(), BoxError>;
}

/// A destination that takes whole batches of one kind across all tables.
#[async_trait]
pub trait MixedBatchClient: Send + Sync + 'static {
    async fn migrate_table_batch(&self, messages: Vec<MigrateTable>) -> Result<(), BoxError>;

    /// Write one batch of inserts, possibly addressed to several tables.
    async fn insert_batch(&self, messages: Vec<Insert>) -> Result<(), BoxError>;

    async fn delete_stale_batch(&self, messages: Vec<DeleteStale>) -> Result<(), BoxError>;

    async fn delete_record_batch(&self, messages: Vec<DeleteRecord>) -> Result<(), BoxError>;
}

/// A destination that reads each batch from a channel.
///
/// Every call receives one batch and must read until the channel yields
/// `None`. Returning early with `Ok` while messages are still being sent is
/// reported as an error by the writer.
#[async_trait]
pub trait StreamingClient: Send + Sync + 'static {
    async fn migrate_tables(&self, messages: mpsc::Receiver<MigrateTable>)
    -> Result<(), BoxError>;

    /// Read one batch of inserts for a single table.
    async fn write_table(&self, messages: mpsc::Receiver<Insert>) -> Result<(), BoxError>;

    async fn delete_stale(&self, messages: mpsc::Receiver<DeleteStale>) -> Result<(), BoxError>;

    async fn delete_records(&self, messages: mpsc::Receiver<DeleteRecord>)
    -> Result<(), BoxError>;
}
