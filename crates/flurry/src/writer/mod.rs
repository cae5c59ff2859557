//! Writers: drive a producer's message stream into destination clients.
//!
//! [`BatchWriter`] and [`StreamingBatchWriter`] share one coordinator,
//! which keeps one worker per insert table and one per other message kind.
//! When the stream switches kind, every worker is flushed and acknowledged
//! before the new message is routed, so the destination sees all batches of
//! one kind before any batch of the next.
//!
//! [`MixedBatchWriter`] runs a single worker over the whole stream instead.

mod batch;
mod mixed;
mod streaming;

pub use batch::BatchWriter;
pub use mixed::MixedBatchWriter;
pub use streaming::StreamingBatchWriter;

use std::sync::{Mutex, MutexGuard, PoisonError};

use flurry_core::emit;
use flurry_core::metrics::events::{ActiveWorkers, KindTransition};
use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WriterConfig;
use crate::error::WriterError;
use crate::message::{
    Batchable, DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable,
};
use crate::worker::{BatchSink, FlushAck, Worker, WorkerKey};

/// Capacity of every worker queue.
///
/// A send completes only once the worker has room, so a slow destination
/// stalls the producer instead of growing a queue.
const WORKER_CHANNEL_CAPACITY: usize = 1;

/// Builds the sink behind each worker.
pub(crate) trait SinkFactory: Send + Sync + 'static {
    fn migrate_tables(&self) -> Box<dyn BatchSink<MigrateTable>>;

    fn insert(&self, table: &str) -> Box<dyn BatchSink<Insert>>;

    fn delete_stale(&self) -> Box<dyn BatchSink<DeleteStale>>;

    fn delete_records(&self) -> Box<dyn BatchSink<DeleteRecord>>;
}

/// A worker's message queue, typed by the kind it accepts.
#[derive(Clone)]
enum Inbox {
    MigrateTable(mpsc::Sender<MigrateTable>),
    Insert(mpsc::Sender<Insert>),
    DeleteStale(mpsc::Sender<DeleteStale>),
    DeleteRecord(mpsc::Sender<DeleteRecord>),
}

impl Inbox {
    /// Hand `message` to the worker. Returns false when the worker is gone.
    async fn send(&self, message: Message) -> bool {
        match (self, message) {
            (Inbox::MigrateTable(tx), Message::MigrateTable(m)) => tx.send(m).await.is_ok(),
            (Inbox::Insert(tx), Message::Insert(m)) => tx.send(m).await.is_ok(),
            (Inbox::DeleteStale(tx), Message::DeleteStale(m)) => tx.send(m).await.is_ok(),
            (Inbox::DeleteRecord(tx), Message::DeleteRecord(m)) => tx.send(m).await.is_ok(),
            _ => false,
        }
    }
}

struct Route {
    inbox: Inbox,
    flushes: mpsc::Sender<FlushAck>,
    task: JoinHandle<Result<(), WriterError>>,
}

/// Cancellation scope of one `write` call.
struct WriteScope {
    /// Stops this call's workers. A child of the caller's shutdown token.
    cancel: CancellationToken,
    /// Tripped by the first worker that fails.
    failed: CancellationToken,
}

/// Routes messages to lazily created workers and orders flushes by kind.
///
/// Workers belong to the writer, not to a `write` call, so calls on one
/// writer run one at a time.
pub(crate) struct Coordinator<F> {
    factory: F,
    config: WriterConfig,
    writer: &'static str,
    workers: Mutex<IndexMap<WorkerKey, Route>>,
    /// Held for the whole of a `write` call.
    writing: tokio::sync::Mutex<()>,
}

impl<F: SinkFactory> Coordinator<F> {
    pub fn new(factory: F, config: WriterConfig, writer: &'static str) -> Self {
        Self {
            factory,
            config,
            writer,
            workers: Mutex::new(IndexMap::new()),
            writing: tokio::sync::Mutex::new(()),
        }
    }

    /// Drain `messages` into workers, then flush and join every worker.
    ///
    /// Waits for any other `write` on this coordinator to finish first.
    pub async fn write(
        &self,
        shutdown: CancellationToken,
        mut messages: mpsc::Receiver<Message>,
    ) -> Result<(), WriterError> {
        let _writing = tokio::select! {
            biased;

            () = shutdown.cancelled() => return Err(WriterError::Cancelled),
            guard = self.writing.lock() => guard,
        };

        let scope = WriteScope {
            cancel: shutdown.child_token(),
            failed: CancellationToken::new(),
        };

        let outcome = tokio::select! {
            biased;

            () = shutdown.cancelled() => Err(WriterError::Cancelled),
            // Replaced below by the failing worker's own error.
            () = scope.failed.cancelled() => Err(WriterError::Cancelled),
            outcome = self.drain(&scope, &mut messages) => outcome,
        };

        let outcome = match outcome {
            Ok(()) => self.close().await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                info!(writer = self.writer, "Write finished");
                Ok(())
            }
            Err(err) => {
                scope.cancel.cancel();
                let workers = self.join_all().await;
                Err(match workers {
                    Err(worker_err) if !worker_err.is_cancelled() => worker_err,
                    _ => err,
                })
            }
        }
    }

    async fn drain(
        &self,
        scope: &WriteScope,
        messages: &mut mpsc::Receiver<Message>,
    ) -> Result<(), WriterError> {
        let mut last_kind: Option<MessageKind> = None;

        while let Some(message) = messages.recv().await {
            let kind = message.kind();
            if let Some(previous) = last_kind.filter(|previous| *previous != kind) {
                debug!(from = %previous, to = %kind, "Message kind changed, flushing workers");
                emit!(KindTransition {
                    from: previous.as_str(),
                    to: kind.as_str(),
                });
                self.flush().await?;
            }
            last_kind = Some(kind);

            self.route(scope, message).await?;
        }
        Ok(())
    }

    async fn route(&self, scope: &WriteScope, message: Message) -> Result<(), WriterError> {
        let key = match &message {
            Message::Insert(insert) => WorkerKey::Table(insert.table_name()?.to_string()),
            other => WorkerKey::Kind(other.kind()),
        };
        let inbox = self.inbox(scope, &key, &message);

        if !inbox.send(message).await {
            return Err(self.reap(&key).await);
        }
        Ok(())
    }

    /// The inbox of the worker for `key`, starting one if needed.
    fn inbox(&self, scope: &WriteScope, key: &WorkerKey, message: &Message) -> Inbox {
        let mut workers = self.lock();
        if let Some(route) = workers.get(key) {
            return route.inbox.clone();
        }

        let route = match message {
            Message::MigrateTable(_) => self.start(
                scope,
                key,
                self.factory.migrate_tables(),
                Inbox::MigrateTable,
            ),
            Message::Insert(_) => self.start(
                scope,
                key,
                self.factory.insert(&key.to_string()),
                Inbox::Insert,
            ),
            Message::DeleteStale(_) => {
                self.start(scope, key, self.factory.delete_stale(), Inbox::DeleteStale)
            }
            Message::DeleteRecord(_) => self.start(
                scope,
                key,
                self.factory.delete_records(),
                Inbox::DeleteRecord,
            ),
        };
        let inbox = route.inbox.clone();
        workers.insert(key.clone(), route);

        debug!(target = %key, writer = self.writer, "Started worker");
        emit!(ActiveWorkers {
            count: workers.len(),
            writer: self.writer,
        });
        inbox
    }

    fn start<M: Batchable>(
        &self,
        scope: &WriteScope,
        key: &WorkerKey,
        sink: Box<dyn BatchSink<M>>,
        inbox: fn(mpsc::Sender<M>) -> Inbox,
    ) -> Route {
        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let (flushes, flushes_rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        let worker = Worker::new(key.clone(), sink, &self.config);
        let cancel = scope.cancel.clone();
        let failed = scope.failed.clone();

        let task = tokio::spawn(async move {
            let result = worker.run(rx, flushes_rx, cancel).await;
            if result.as_ref().is_err_and(|err| !err.is_cancelled()) {
                failed.cancel();
            }
            result
        });

        Route {
            inbox: inbox(tx),
            flushes,
            task,
        }
    }

    /// Flush every live worker and wait until each batch has been delivered.
    pub async fn flush(&self) -> Result<(), WriterError> {
        let targets: Vec<(WorkerKey, mpsc::Sender<FlushAck>)> = self
            .lock()
            .iter()
            .map(|(key, route)| (key.clone(), route.flushes.clone()))
            .collect();

        let requests = targets.into_iter().map(|(key, flushes)| async move {
            let (ack, done) = FlushAck::new();
            let acked = flushes.send(ack).await.is_ok() && done.await.is_ok();
            (key, acked)
        });

        for (key, acked) in join_all(requests).await {
            if !acked {
                return Err(self.reap(&key).await);
            }
        }
        Ok(())
    }

    /// Flush every worker, close their queues and wait for them to exit.
    pub async fn close(&self) -> Result<(), WriterError> {
        self.flush().await?;
        self.join_all().await
    }

    /// Close every queue and join every worker, in creation order.
    ///
    /// Returns the first real failure, or a cancellation if that is all there was.
    async fn join_all(&self) -> Result<(), WriterError> {
        let routes: Vec<(WorkerKey, Route)> = self.lock().drain(..).collect();
        emit!(ActiveWorkers {
            count: 0,
            writer: self.writer,
        });

        let tasks = routes
            .into_iter()
            .map(|(key, Route { task, .. })| join_worker(key, task));

        let mut cancelled = None;
        for result in join_all(tasks).await {
            match result {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {
                    cancelled.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        cancelled.map_or(Ok(()), Err)
    }

    /// Remove a worker that stopped accepting work and return why it stopped.
    async fn reap(&self, key: &WorkerKey) -> WriterError {
        let route = self.lock().shift_remove(key);
        let Some(Route { task, .. }) = route else {
            return WriterError::WorkerGone {
                target: key.to_string(),
            };
        };

        match join_worker(key.clone(), task).await {
            Err(err) => err,
            Ok(()) => WriterError::WorkerGone {
                target: key.to_string(),
            },
        }
    }

    #[cfg(test)]
    pub fn active_workers(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<WorkerKey, Route>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn join_worker(
    key: WorkerKey,
    task: JoinHandle<Result<(), WriterError>>,
) -> Result<(), WriterError> {
    match task.await {
        Ok(result) => result,
        Err(source) => Err(WriterError::WorkerJoin {
            target: key.to_string(),
            source,
        }),
    }
}
