//! Writer for destinations that take whole batches.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Coordinator, SinkFactory};
use crate::client::BatchClient;
use crate::config::WriterConfig;
use crate::error::WriterError;
use crate::message::{DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable};
use crate::worker::{BatchSink, ClientSink};

/// Batches inserts per table and every other kind on its own, delivering
/// each completed batch with one [`BatchClient`] call.
pub struct BatchWriter<C: BatchClient> {
    coordinator: Coordinator<BatchSinks<C>>,
}

impl<C: BatchClient> BatchWriter<C> {
    pub fn new(client: Arc<C>, config: WriterConfig) -> Self {
        Self {
            coordinator: Coordinator::new(BatchSinks { client }, config, "batch"),
        }
    }

    /// Write every message from `messages`, returning once all of them have
    /// been delivered or the first failure.
    ///
    /// Cancelling `shutdown` stops the write; batches still buffered are lost.
    /// Calls on one writer run one after another.
    pub async fn write(
        &self,
        shutdown: CancellationToken,
        messages: mpsc::Receiver<Message>,
    ) -> Result<(), WriterError> {
        self.coordinator.write(shutdown, messages).await
    }

    /// Deliver every buffered batch and wait for the client to accept them.
    pub async fn flush(&self) -> Result<(), WriterError> {
        self.coordinator.flush().await
    }

    /// Flush, then stop every worker.
    pub async fn close(&self) -> Result<(), WriterError> {
        self.coordinator.close().await
    }
}

struct BatchSinks<C> {
    client: Arc<C>,
}

impl<C: BatchClient> SinkFactory for BatchSinks<C> {
    fn migrate_tables(&self) -> Box<dyn BatchSink<MigrateTable>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::MigrateTable;
        Box::new(ClientSink::new(kind, kind.as_str(), move |batch: Vec<MigrateTable>| {
            let client = Arc::clone(&client);
            async move { client.migrate_tables(batch).await }.boxed()
        }))
    }

    fn insert(&self, table: &str) -> Box<dyn BatchSink<Insert>> {
        let client = Arc::clone(&self.client);
        let name = table.to_string();
        Box::new(ClientSink::new(MessageKind::Insert, table, move |batch: Vec<Insert>| {
            let client = Arc::clone(&client);
            let table = name.clone();
            async move { client.write_table_batch(&table, batch).await }.boxed()
        }))
    }

    fn delete_stale(&self) -> Box<dyn BatchSink<DeleteStale>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::DeleteStale;
        Box::new(ClientSink::new(kind, kind.as_str(), move |batch: Vec<DeleteStale>| {
            let client = Arc::clone(&client);
            async move { client.delete_stale(batch).await }.boxed()
        }))
    }

    fn delete_records(&self) -> Box<dyn BatchSink<DeleteRecord>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::DeleteRecord;
        Box::new(ClientSink::new(kind, kind.as_str(), move |batch: Vec<DeleteRecord>| {
            let client = Arc::clone(&client);
            async move { client.delete_records(batch).await }.boxed()
        }))
    }
}
