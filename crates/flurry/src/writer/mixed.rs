//! Writer for destinations that take one batch per kind across all tables.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use flurry_core::emit;
use flurry_core::metrics::events::ActiveWorkers;
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::MixedBatchClient;
use crate::config::WriterConfig;
use crate::error::{ClientSnafu, WriterError};
use crate::message::{DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable};
use crate::worker::{BatchSink, Worker, WorkerKey};

const WRITER: &str = "mixed";

/// Batches the whole stream in one worker.
///
/// A batch holds messages of one kind for any number of tables and is
/// delivered when the budget fills, the idle timer fires, or the kind changes.
pub struct MixedBatchWriter<C: MixedBatchClient> {
    client: Arc<C>,
    config: WriterConfig,
}

impl<C: MixedBatchClient> MixedBatchWriter<C> {
    pub fn new(client: Arc<C>, config: WriterConfig) -> Self {
        Self { client, config }
    }

    pub async fn write(
        &self,
        shutdown: CancellationToken,
        messages: mpsc::Receiver<Message>,
    ) -> Result<(), WriterError> {
        let sink = MixedSink {
            client: Arc::clone(&self.client),
            pending: Pending::Empty,
        };
        let worker = Worker::<Message>::new(WorkerKey::Mixed, Box::new(sink), &self.config);

        // Nothing requests flushes here; the sender only keeps the queue open.
        let (_flushes, flushes_rx) = mpsc::channel(1);

        emit!(ActiveWorkers {
            count: 1,
            writer: WRITER,
        });
        let result = worker
            .run(messages, flushes_rx, shutdown.child_token())
            .await;
        emit!(ActiveWorkers {
            count: 0,
            writer: WRITER,
        });

        if result.is_ok() {
            info!(writer = WRITER, "Write finished");
        }
        result
    }
}

/// The open batch, typed by its kind.
enum Pending {
    Empty,
    MigrateTable(Vec<MigrateTable>),
    Insert(Vec<Insert>),
    DeleteStale(Vec<DeleteStale>),
    DeleteRecord(Vec<DeleteRecord>),
}

impl Pending {
    fn kind(&self) -> Option<MessageKind> {
        match self {
            Pending::Empty => None,
            Pending::MigrateTable(_) => Some(MessageKind::MigrateTable),
            Pending::Insert(_) => Some(MessageKind::Insert),
            Pending::DeleteStale(_) => Some(MessageKind::DeleteStale),
            Pending::DeleteRecord(_) => Some(MessageKind::DeleteRecord),
        }
    }
}

struct MixedSink<C> {
    client: Arc<C>,
    pending: Pending,
}

#[async_trait]
impl<C: MixedBatchClient> BatchSink<Message> for MixedSink<C> {
    async fn append(&mut self, message: Message) -> Result<(), WriterError> {
        if self.pending.kind().is_some_and(|kind| kind != message.kind()) {
            self.flush().await?;
        }

        match (&mut self.pending, message) {
            (Pending::MigrateTable(batch), Message::MigrateTable(m)) => batch.push(m),
            (Pending::Insert(batch), Message::Insert(m)) => batch.push(m),
            (Pending::DeleteStale(batch), Message::DeleteStale(m)) => batch.push(m),
            (Pending::DeleteRecord(batch), Message::DeleteRecord(m)) => batch.push(m),
            (pending, message) => {
                *pending = match message {
                    Message::MigrateTable(m) => Pending::MigrateTable(vec![m]),
                    Message::Insert(m) => Pending::Insert(vec![m]),
                    Message::DeleteStale(m) => Pending::DeleteStale(vec![m]),
                    Message::DeleteRecord(m) => Pending::DeleteRecord(vec![m]),
                }
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        let Some(kind) = self.pending.kind() else {
            return Ok(());
        };

        let result = match mem::replace(&mut self.pending, Pending::Empty) {
            Pending::Empty => Ok(()),
            Pending::MigrateTable(batch) => self.client.migrate_table_batch(batch).await,
            Pending::Insert(batch) => self.client.insert_batch(batch).await,
            Pending::DeleteStale(batch) => self.client.delete_stale_batch(batch).await,
            Pending::DeleteRecord(batch) => self.client.delete_record_batch(batch).await,
        };
        result.context(ClientSnafu {
            kind,
            target: WRITER,
        })
    }

    fn is_empty(&self) -> bool {
        matches!(self.pending, Pending::Empty)
    }

    async fn abort(&mut self) {
        self.pending = Pending::Empty;
    }
}
