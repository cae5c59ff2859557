//! Per-destination batch accumulation.
//!
//! A [`Worker`] owns everything about one destination's open batch: the
//! pieces accumulated so far (held by a [`BatchSink`]), the [`Cap`] they are
//! measured against, and the idle deadline. It reacts to four things:
//!
//! - a message: carve it against the budget, flushing whenever a batch fills
//! - a flush request: flush if anything is buffered, then acknowledge
//! - the idle deadline: flush a batch that has been waiting too long
//! - the end of its queue: flush what is left and exit
//!
//! Cancellation stops the worker immediately. Whatever was buffered is
//! dropped without reaching the destination.

mod sink;

pub(crate) use sink::{ClientSink, StreamSink};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use flurry_core::emit;
use flurry_core::metrics::events::{
    BatchFlushed, BytesWritten, FlushDuration, FlushFailed, FlushReason, RecordSplit,
    RecordsWritten,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cap::Cap;
use crate::config::WriterConfig;
use crate::error::WriterError;
use crate::message::{Batchable, MessageKind};
use crate::slicer::Split;

/// Identifies the destination a worker batches for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkerKey {
    /// Inserts into one table.
    Table(String),
    /// Every message of a kind that is not split by table.
    Kind(MessageKind),
    /// Every message, grouped by kind across all tables.
    Mixed,
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKey::Table(table) => f.write_str(table),
            WorkerKey::Kind(kind) => write!(f, "{kind}"),
            WorkerKey::Mixed => f.write_str("mixed"),
        }
    }
}

/// Single-use acknowledgement for a flush request.
///
/// The requester keeps the receiver and waits on it; the worker acknowledges
/// once the batch it held has reached the destination.
#[derive(Debug)]
pub struct FlushAck(oneshot::Sender<()>);

impl FlushAck {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn ack(self) {
        // The requester may have stopped waiting.
        let _ = self.0.send(());
    }
}

/// Where a worker's batch accumulates and how it reaches the destination.
#[async_trait]
pub(crate) trait BatchSink<M: Send + 'static>: Send {
    /// Add one piece to the open batch.
    async fn append(&mut self, message: M) -> Result<(), WriterError>;

    /// Deliver the open batch. Nothing happens when it is empty.
    async fn flush(&mut self) -> Result<(), WriterError>;

    fn is_empty(&self) -> bool;

    /// Drop the open batch without delivering it.
    ///
    /// Returns once nothing started for the batch is still running.
    async fn abort(&mut self) {}
}

pub(crate) struct Worker<M: Batchable> {
    key: WorkerKey,
    sink: Box<dyn BatchSink<M>>,
    cap: Cap,
    timeout: Option<Duration>,
    deadline: Instant,
    kind: Option<MessageKind>,
}

impl<M: Batchable> Worker<M> {
    pub fn new(key: WorkerKey, sink: Box<dyn BatchSink<M>>, config: &WriterConfig) -> Self {
        Self {
            key,
            sink,
            cap: config.cap(),
            timeout: config.batch_timeout(),
            deadline: Instant::now(),
            kind: None,
        }
    }

    /// Process messages until the queue closes, a flush fails, or `cancel` fires.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<M>,
        mut flushes: mpsc::Receiver<FlushAck>,
        cancel: CancellationToken,
    ) -> Result<(), WriterError> {
        debug!(target = %self.key, "Worker started");

        let result = cancel
            .run_until_cancelled(self.process(&mut messages, &mut flushes))
            .await
            .unwrap_or(Err(WriterError::Cancelled));

        match &result {
            Ok(()) => debug!(target = %self.key, "Worker finished"),
            Err(WriterError::Cancelled) => {
                if !self.sink.is_empty() {
                    warn!(
                        target = %self.key,
                        rows = self.cap.rows(),
                        "Worker cancelled, dropping buffered batch"
                    );
                }
                self.sink.abort().await;
            }
            Err(e) => {
                warn!(target = %self.key, error = %e, "Worker failed");
                self.sink.abort().await;
            }
        }
        result
    }

    async fn process(
        &mut self,
        messages: &mut mpsc::Receiver<M>,
        flushes: &mut mpsc::Receiver<FlushAck>,
    ) -> Result<(), WriterError> {
        loop {
            let idle = self.timeout.is_some() && !self.sink.is_empty();

            tokio::select! {
                biased;

                // Messages first: anything sent before a flush request belongs
                // to the batch that request flushes.
                message = messages.recv() => match message {
                    Some(message) => self.ingest(message).await?,
                    None => {
                        self.flush(FlushReason::Close).await?;
                        return Ok(());
                    }
                },

                Some(ack) = flushes.recv() => {
                    self.flush(FlushReason::Requested).await?;
                    ack.ack();
                }

                () = tokio::time::sleep_until(self.deadline), if idle => {
                    self.flush(FlushReason::Timeout).await?;
                }
            }
        }
    }

    async fn ingest(&mut self, message: M) -> Result<(), WriterError> {
        // Checked before splitting: an empty record never reaches the sink.
        message.validate()?;
        let kind = message.kind();
        if self.kind.is_some_and(|current| current != kind) {
            self.flush(FlushReason::KindChange).await?;
        }
        self.kind = Some(kind);

        let split = message.split(self.cap);
        if split.pieces() > 1 {
            emit!(RecordSplit {
                pieces: split.pieces() as u64,
                target: self.key.to_string(),
            });
        }
        let Split {
            to_append,
            to_flush,
            remainder,
        } = split;

        if let Some(piece) = to_append {
            self.push(piece).await?;
        }

        // Each full piece is a batch of its own.
        for piece in to_flush {
            self.flush(FlushReason::Size).await?;
            self.push(piece).await?;
            self.flush(FlushReason::Size).await?;
        }

        if let Some(rest) = remainder {
            self.flush(FlushReason::Size).await?;
            self.push(rest).await?;
        }

        if self.cap.reached_limit() {
            self.flush(FlushReason::Size).await?;
        }
        Ok(())
    }

    async fn push(&mut self, piece: M) -> Result<(), WriterError> {
        if self.sink.is_empty() {
            self.arm_timer();
        }
        self.cap.add_slice(&piece);
        self.sink.append(piece).await
    }

    async fn flush(&mut self, reason: FlushReason) -> Result<(), WriterError> {
        if self.sink.is_empty() {
            return Ok(());
        }

        let rows = self.cap.rows();
        let bytes = self.cap.bytes();
        let kind = self.kind.map_or("unknown", |kind| kind.as_str());
        let start = Instant::now();

        let result = self.sink.flush().await;
        self.cap.reset();
        self.arm_timer();

        let target = self.key.to_string();
        match &result {
            Ok(()) => {
                let elapsed = start.elapsed();
                debug!(
                    target = %self.key,
                    kind,
                    reason = reason.as_str(),
                    rows,
                    bytes,
                    elapsed_ms = elapsed.as_millis(),
                    "Flushed batch"
                );
                emit!(BatchFlushed {
                    kind,
                    reason,
                    target: target.clone(),
                });
                emit!(RecordsWritten {
                    count: rows as u64,
                    target: target.clone(),
                });
                emit!(BytesWritten {
                    bytes: bytes as u64,
                    target: target.clone(),
                });
                emit!(FlushDuration {
                    duration: elapsed,
                    target,
                });
            }
            Err(_) => emit!(FlushFailed { kind, target }),
        }
        result
    }

    fn arm_timer(&mut self) {
        if let Some(timeout) = self.timeout {
            self.deadline = Instant::now() + timeout;
        }
    }
}
