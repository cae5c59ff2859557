//! Internal events for flurry metrics emission.
//!
//! Each struct describes one measurable occurrence in the write engine.
//! Every series carries a `target` label naming the destination table (or the
//! message kind for workers that are not split by table).

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Why a worker flushed its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The row or byte budget filled up.
    Size,
    /// The idle timer fired.
    Timeout,
    /// A coordinator asked for a flush and waits for the acknowledgement.
    Requested,
    /// A message of a different kind arrived.
    KindChange,
    /// The worker's queue closed.
    Close,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Timeout => "timeout",
            FlushReason::Requested => "requested",
            FlushReason::KindChange => "kind_change",
            FlushReason::Close => "close",
        }
    }
}

/// Rows delivered to the destination client.
pub struct RecordsWritten {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsWritten {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records written");
        counter!("flurry_records_written_total", "target" => self.target).increment(self.count);
    }
}

/// Estimated bytes delivered to the destination client.
pub struct BytesWritten {
    pub bytes: u64,
    pub target: String,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Bytes written");
        counter!("flurry_bytes_written_total", "target" => self.target).increment(self.bytes);
    }
}

/// A batch was handed to the destination client.
pub struct BatchFlushed {
    pub kind: &'static str,
    pub reason: FlushReason,
    pub target: String,
}

impl InternalEvent for BatchFlushed {
    fn emit(self) {
        trace!(kind = self.kind, reason = self.reason.as_str(), target = %self.target, "Batch flushed");
        counter!(
            "flurry_batches_flushed_total",
            "kind" => self.kind,
            "reason" => self.reason.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// Time spent inside one destination flush.
pub struct FlushDuration {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for FlushDuration {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Flush completed"
        );
        histogram!("flurry_flush_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// A destination flush failed.
pub struct FlushFailed {
    pub kind: &'static str,
    pub target: String,
}

impl InternalEvent for FlushFailed {
    fn emit(self) {
        trace!(kind = self.kind, target = %self.target, "Flush failed");
        counter!("flurry_flush_failures_total", "kind" => self.kind, "target" => self.target)
            .increment(1);
    }
}

/// Number of workers alive in a writer.
pub struct ActiveWorkers {
    pub count: usize,
    pub writer: &'static str,
}

impl InternalEvent for ActiveWorkers {
    fn emit(self) {
        trace!(count = self.count, writer = self.writer, "Active workers");
        gauge!("flurry_active_workers", "writer" => self.writer).set(self.count as f64);
    }
}

/// The message stream switched from one kind to another.
pub struct KindTransition {
    pub from: &'static str,
    pub to: &'static str,
}

impl InternalEvent for KindTransition {
    fn emit(self) {
        trace!(from = self.from, to = self.to, "Message kind transition");
        counter!("flurry_kind_transitions_total", "from" => self.from, "to" => self.to)
            .increment(1);
    }
}

/// A record was carved into more than one piece to respect the budget.
pub struct RecordSplit {
    pub pieces: u64,
    pub target: String,
}

impl InternalEvent for RecordSplit {
    fn emit(self) {
        trace!(pieces = self.pieces, target = %self.target, "Record split");
        counter!("flurry_record_splits_total", "target" => self.target).increment(1);
        histogram!("flurry_record_split_pieces").record(self.pieces as f64);
    }
}
