//! Error types for the flurry write engine.

use snafu::prelude::*;

pub use flurry_core::error::ConfigError;

use crate::client::BoxError;
use crate::message::MessageKind;

/// Errors that end a `write` call.
///
/// Every variant is terminal for the call that produced it. Callers may start
/// a new `write` with a fresh stream.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriterError {
    /// An insert record carries no destination table in its schema metadata.
    #[snafu(display("Insert record has no table name in its schema metadata"))]
    MissingTableName,

    /// The destination client rejected a batch.
    #[snafu(display("Failed to {kind} batch for {target}: {source}"))]
    Client {
        kind: MessageKind,
        target: String,
        source: BoxError,
    },

    /// A streaming handler panicked while reading a batch.
    #[snafu(display("Streaming {kind} handler for {target} panicked: {message}"))]
    HandlerPanic {
        kind: MessageKind,
        target: String,
        message: String,
    },

    /// A streaming handler task could not be joined.
    #[snafu(display("Failed to join streaming handler for {target}: {source}"))]
    HandlerJoin {
        target: String,
        source: tokio::task::JoinError,
    },

    /// A streaming handler stopped reading before its batch ended.
    #[snafu(display("Streaming {kind} handler for {target} stopped reading before the batch ended"))]
    StreamClosed { kind: MessageKind, target: String },

    /// A worker exited without reporting why.
    #[snafu(display("Worker for {target} exited unexpectedly"))]
    WorkerGone { target: String },

    /// A worker task panicked or could not be joined.
    #[snafu(display("Failed to join worker for {target}: {source}"))]
    WorkerJoin {
        target: String,
        source: tokio::task::JoinError,
    },

    /// The shutdown token fired before the stream was drained.
    #[snafu(display("Write cancelled"))]
    Cancelled,

    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },
}

impl WriterError {
    /// Check if this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WriterError::Cancelled)
    }
}

impl From<ConfigError> for WriterError {
    fn from(source: ConfigError) -> Self {
        WriterError::Config { source }
    }
}
