//! In-memory destination clients and message builders for unit tests.

use std::sync::{Arc, Mutex};

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use crate::client::{BatchClient, BoxError, MixedBatchClient, StreamingClient};
use crate::message::{
    DeleteRecord, DeleteStale, Insert, Message, MessageKind, MigrateTable, TableRelation,
};
use crate::record::{self, Measured};

/// One batch as the destination saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub kind: MessageKind,
    /// Destination table of every message, in order.
    pub tables: Vec<String>,
    pub rows: usize,
}

impl Delivery {
    pub fn new(kind: MessageKind, tables: &[&str], rows: usize) -> Self {
        Self {
            kind,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            rows,
        }
    }
}

/// Records every batch it receives, through any of the three contracts.
#[derive(Default)]
pub(crate) struct RecordingClient {
    deliveries: Mutex<Vec<Delivery>>,
    fail_on: Option<MessageKind>,
    panic_on: Option<MessageKind>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every batch of `kind`.
    pub fn failing(kind: MessageKind) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(kind),
            ..Self::default()
        })
    }

    /// Panic while streaming a batch of `kind`.
    pub fn panicking(kind: MessageKind) -> Arc<Self> {
        Arc::new(Self {
            panic_on: Some(kind),
            ..Self::default()
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        self.deliveries().iter().map(|d| d.kind).collect()
    }

    pub fn rows(&self, kind: MessageKind) -> usize {
        self.deliveries()
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.rows)
            .sum()
    }

    fn record(&self, kind: MessageKind, tables: Vec<String>, rows: usize) -> Result<(), BoxError> {
        if self.fail_on == Some(kind) {
            return Err(format!("{kind} rejected").into());
        }
        self.deliveries
            .lock()
            .unwrap()
            .push(Delivery { kind, tables, rows });
        Ok(())
    }

    fn record_messages(&self, messages: Vec<Message>) -> Result<(), BoxError> {
        let Some(kind) = messages.first().map(Message::kind) else {
            return Ok(());
        };
        let rows = messages.iter().map(Measured::rows).sum();
        let tables = messages
            .iter()
            .map(|m| m.table_name().unwrap_or_default().to_string())
            .collect();
        self.record(kind, tables, rows)
    }

    async fn drain<T: Into<Message>>(&self, mut rx: mpsc::Receiver<T>) -> Result<(), BoxError> {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            let message = message.into();
            if self.panic_on == Some(message.kind()) {
                panic!("{} handler panicked", message.kind());
            }
            messages.push(message);
        }
        self.record_messages(messages)
    }
}

fn wrap<T: Into<Message>>(messages: Vec<T>) -> Vec<Message> {
    messages.into_iter().map(Into::into).collect()
}

#[async_trait]
impl BatchClient for RecordingClient {
    async fn migrate_tables(&self, messages: Vec<MigrateTable>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }

    async fn write_table_batch(
        &self,
        table: &str,
        messages: Vec<Insert>,
    ) -> Result<(), BoxError> {
        assert!(messages.iter().all(|m| m.table_name().ok() == Some(table)));
        self.record_messages(wrap(messages))
    }

    async fn delete_stale(&self, messages: Vec<DeleteStale>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }

    async fn delete_records(&self, messages: Vec<DeleteRecord>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }
}

#[async_trait]
impl MixedBatchClient for RecordingClient {
    async fn migrate_table_batch(&self, messages: Vec<MigrateTable>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }

    async fn insert_batch(&self, messages: Vec<Insert>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }

    async fn delete_stale_batch(&self, messages: Vec<DeleteStale>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }

    async fn delete_record_batch(&self, messages: Vec<DeleteRecord>) -> Result<(), BoxError> {
        self.record_messages(wrap(messages))
    }
}

#[async_trait]
impl StreamingClient for RecordingClient {
    async fn migrate_tables(
        &self,
        messages: mpsc::Receiver<MigrateTable>,
    ) -> Result<(), BoxError> {
        self.drain(messages).await
    }

    async fn write_table(&self, messages: mpsc::Receiver<Insert>) -> Result<(), BoxError> {
        self.drain(messages).await
    }

    async fn delete_stale(&self, messages: mpsc::Receiver<DeleteStale>) -> Result<(), BoxError> {
        self.drain(messages).await
    }

    async fn delete_records(
        &self,
        messages: mpsc::Receiver<DeleteRecord>,
    ) -> Result<(), BoxError> {
        self.drain(messages).await
    }
}

fn id_schema() -> Schema {
    Schema::new(vec![Field::new("id", DataType::Int64, false)])
}

fn ids(num_rows: usize, schema: Schema) -> RecordBatch {
    let values: Vec<i64> = (0..num_rows as i64).collect();
    RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(values))])
        .expect("ids match the schema")
}

/// `rows` rows for `table`, 8 bytes each.
pub(crate) fn insert(table: &str, rows: usize) -> Message {
    let schema = record::with_table_name(id_schema(), table);
    Insert::new(ids(rows, schema)).into()
}

/// An insert whose record names no table.
pub(crate) fn unaddressed_insert(rows: usize) -> Message {
    Insert::new(ids(rows, id_schema())).into()
}

pub(crate) fn migrate(table: &str) -> Message {
    MigrateTable::new(table, Arc::new(record::with_table_name(id_schema(), table))).into()
}

pub(crate) fn delete_stale(table: &str) -> Message {
    DeleteStale {
        table_name: table.to_string(),
        source_name: "test_source".to_string(),
        sync_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
    .into()
}

pub(crate) fn delete_record(table: &str) -> Message {
    DeleteRecord {
        table_name: table.to_string(),
        table_relations: vec![TableRelation {
            table_name: format!("{table}_children"),
            parent_table: table.to_string(),
        }],
        keys: ids(1, id_schema()),
    }
    .into()
}

/// Let every task run until it blocks.
///
/// Needs a paused clock: time only advances once the runtime is idle.
pub(crate) async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}

/// Feed `messages` into a fresh channel and close it.
pub(crate) fn channel_of(messages: Vec<Message>) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(messages.len().max(1));
    for message in messages {
        tx.try_send(message).expect("channel sized for every message");
    }
    rx
}
