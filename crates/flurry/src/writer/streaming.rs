//! Writer for destinations that read each batch from a channel.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Coordinator, SinkFactory};
use crate::client::StreamingClient;
use crate::config::WriterConfig;
use crate::error::WriterError;
use crate::message::{DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable};
use crate::worker::{BatchSink, StreamSink};

/// Routes messages like [`BatchWriter`](super::BatchWriter), but streams each
/// batch to a [`StreamingClient`] call running in its own task.
///
/// A batch ends when its channel closes. Errors returned by the client and
/// panics inside it both end the write.
pub struct StreamingBatchWriter<C: StreamingClient> {
    coordinator: Coordinator<StreamSinks<C>>,
}

impl<C: StreamingClient> StreamingBatchWriter<C> {
    pub fn new(client: Arc<C>, config: WriterConfig) -> Self {
        Self {
            coordinator: Coordinator::new(StreamSinks { client }, config, "streaming"),
        }
    }

    /// Like [`BatchWriter::write`](super::BatchWriter::write); calls on one
    /// writer run one after another.
    pub async fn write(
        &self,
        shutdown: CancellationToken,
        messages: mpsc::Receiver<Message>,
    ) -> Result<(), WriterError> {
        self.coordinator.write(shutdown, messages).await
    }

    /// Close every open stream and wait for the client to finish reading it.
    pub async fn flush(&self) -> Result<(), WriterError> {
        self.coordinator.flush().await
    }

    pub async fn close(&self) -> Result<(), WriterError> {
        self.coordinator.close().await
    }
}

struct StreamSinks<C> {
    client: Arc<C>,
}

impl<C: StreamingClient> SinkFactory for StreamSinks<C> {
    fn migrate_tables(&self) -> Box<dyn BatchSink<MigrateTable>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::MigrateTable;
        Box::new(StreamSink::new(
            kind,
            kind.as_str(),
            move |rx: mpsc::Receiver<MigrateTable>| {
                let client = Arc::clone(&client);
                async move { client.migrate_tables(rx).await }.boxed()
            },
        ))
    }

    fn insert(&self, table: &str) -> Box<dyn BatchSink<Insert>> {
        let client = Arc::clone(&self.client);
        Box::new(StreamSink::new(
            MessageKind::Insert,
            table,
            move |rx: mpsc::Receiver<Insert>| {
                let client = Arc::clone(&client);
                async move { client.write_table(rx).await }.boxed()
            },
        ))
    }

    fn delete_stale(&self) -> Box<dyn BatchSink<DeleteStale>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::DeleteStale;
        Box::new(StreamSink::new(
            kind,
            kind.as_str(),
            move |rx: mpsc::Receiver<DeleteStale>| {
                let client = Arc::clone(&client);
                async move { client.delete_stale(rx).await }.boxed()
            },
        ))
    }

    fn delete_records(&self) -> Box<dyn BatchSink<DeleteRecord>> {
        let client = Arc::clone(&self.client);
        let kind = MessageKind::DeleteRecord;
        Box::new(StreamSink::new(
            kind,
            kind.as_str(),
            move |rx: mpsc::Receiver<DeleteRecord>| {
                let client = Arc::clone(&client);
                async move { client.delete_records(rx).await }.boxed()
            },
        ))
    }
}
