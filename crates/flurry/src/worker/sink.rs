//! Batch sinks backed by destination clients.

use std::any::Any;

use async_trait::async_trait;
use futures::future::BoxFuture;
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::BatchSink;
use crate::client::BoxError;
use crate::error::{ClientSnafu, HandlerPanicSnafu, StreamClosedSnafu, WriterError};
use crate::message::MessageKind;

/// Messages buffered between a worker and a streaming handler.
const STREAM_CHANNEL_CAPACITY: usize = 1;

type Deliver<M> = Box<dyn FnMut(Vec<M>) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Buffers a batch in memory and hands it to the client in one call.
pub(crate) struct ClientSink<M> {
    buffer: Vec<M>,
    deliver: Deliver<M>,
    kind: MessageKind,
    target: String,
}

impl<M> ClientSink<M> {
    pub fn new<F>(kind: MessageKind, target: impl Into<String>, deliver: F) -> Self
    where
        F: FnMut(Vec<M>) -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static,
    {
        Self {
            buffer: Vec::new(),
            deliver: Box::new(deliver),
            kind,
            target: target.into(),
        }
    }
}

#[async_trait]
impl<M: Send + 'static> BatchSink<M> for ClientSink<M> {
    async fn append(&mut self, message: M) -> Result<(), WriterError> {
        self.buffer.push(message);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        (self.deliver)(batch).await.context(ClientSnafu {
            kind: self.kind,
            target: self.target.as_str(),
        })
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    async fn abort(&mut self) {
        self.buffer.clear();
    }
}

type Open<M> =
    Box<dyn FnMut(mpsc::Receiver<M>) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct OpenStream<M> {
    tx: mpsc::Sender<M>,
    handler: JoinHandle<Result<(), BoxError>>,
}

/// Streams a batch to a spawned client handler.
///
/// The first append of a batch spawns the handler with a fresh channel. A
/// flush closes the channel and waits for the handler, so the batch is
/// complete once the client has returned.
pub(crate) struct StreamSink<M> {
    open: Option<OpenStream<M>>,
    opener: Open<M>,
    kind: MessageKind,
    target: String,
}

impl<M: Send + 'static> StreamSink<M> {
    pub fn new<F>(kind: MessageKind, target: impl Into<String>, opener: F) -> Self
    where
        F: FnMut(mpsc::Receiver<M>) -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static,
    {
        Self {
            open: None,
            opener: Box::new(opener),
            kind,
            target: target.into(),
        }
    }

    async fn finish(&mut self) -> Result<(), WriterError> {
        let Some(OpenStream { tx, handler }) = self.open.take() else {
            return Ok(());
        };
        drop(tx);

        match handler.await {
            Ok(result) => result.context(ClientSnafu {
                kind: self.kind,
                target: self.target.as_str(),
            }),
            Err(e) if e.is_panic() => HandlerPanicSnafu {
                kind: self.kind,
                target: self.target.as_str(),
                message: panic_message(e.into_panic()),
            }
            .fail(),
            Err(source) => Err(WriterError::HandlerJoin {
                target: self.target.clone(),
                source,
            }),
        }
    }
}

#[async_trait]
impl<M: Send + 'static> BatchSink<M> for StreamSink<M> {
    async fn append(&mut self, message: M) -> Result<(), WriterError> {
        let opener = &mut self.opener;
        let stream = self.open.get_or_insert_with(|| {
            let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
            OpenStream {
                tx,
                handler: tokio::spawn((*opener)(rx)),
            }
        });

        if stream.tx.send(message).await.is_ok() {
            return Ok(());
        }

        // The handler dropped its receiver; its result explains why.
        self.finish().await?;
        StreamClosedSnafu {
            kind: self.kind,
            target: self.target.as_str(),
        }
        .fail()
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        self.finish().await
    }

    fn is_empty(&self) -> bool {
        self.open.is_none()
    }

    async fn abort(&mut self) {
        let Some(OpenStream { tx, handler }) = self.open.take() else {
            return;
        };
        // Abort before closing the channel so the handler never sees a complete batch.
        handler.abort();
        let _ = handler.await;
        drop(tx);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
