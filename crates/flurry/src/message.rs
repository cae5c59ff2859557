//! Messages a producer sends to a writer.
//!
//! Every message is addressed to exactly one destination table. Inserts carry
//! it in their record's schema metadata; the other kinds carry it directly.

use std::fmt;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use chrono::{DateTime, Utc};

use crate::cap::Cap;
use crate::error::WriterError;
use crate::record::{self, Measured};
use crate::slicer::{Split, split_record, split_single};

/// The four kinds of message, in the order a sync usually emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    MigrateTable,
    Insert,
    DeleteStale,
    DeleteRecord,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::MigrateTable => "migrate_table",
            MessageKind::Insert => "insert",
            MessageKind::DeleteStale => "delete_stale",
            MessageKind::DeleteRecord => "delete_record",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that workers can accumulate and carve against a [`Cap`].
pub trait Batchable: Measured + Send + Sized + 'static {
    fn kind(&self) -> MessageKind;

    /// Reject a message that cannot be delivered, whatever its size.
    fn validate(&self) -> Result<(), WriterError> {
        Ok(())
    }

    /// Place this message against `cap`.
    ///
    /// Messages are indivisible unless they say otherwise.
    fn split(self, cap: Cap) -> Split<Self> {
        split_single(self, cap)
    }
}

/// Create or update a destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrateTable {
    pub table_name: String,
    pub schema: SchemaRef,
    /// Allow destructive migrations such as dropping columns.
    pub force: bool,
}

impl MigrateTable {
    pub fn new(table_name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            table_name: table_name.into(),
            schema,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Rows to insert into the table named by the record's schema metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    record: RecordBatch,
    bytes: usize,
}

impl Insert {
    /// Wrap `record`, measuring it once.
    pub fn new(record: RecordBatch) -> Self {
        let bytes = record::approx_byte_size(&record);
        Self { record, bytes }
    }

    pub fn record(&self) -> &RecordBatch {
        &self.record
    }

    pub fn into_record(self) -> RecordBatch {
        self.record
    }

    pub fn table_name(&self) -> Result<&str, WriterError> {
        record::table_name(self.record.schema_ref()).ok_or(WriterError::MissingTableName)
    }
}

/// Delete rows of `table_name` written by `source_name` before `sync_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStale {
    pub table_name: String,
    pub source_name: String,
    pub sync_time: DateTime<Utc>,
}

/// A child table whose rows follow deletions from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRelation {
    pub table_name: String,
    pub parent_table: String,
}

/// Delete the rows of `table_name` (and related tables) matching `keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRecord {
    pub table_name: String,
    pub table_relations: Vec<TableRelation>,
    pub keys: RecordBatch,
}

/// Any message a producer can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    MigrateTable(MigrateTable),
    Insert(Insert),
    DeleteStale(DeleteStale),
    DeleteRecord(DeleteRecord),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::MigrateTable(_) => MessageKind::MigrateTable,
            Message::Insert(_) => MessageKind::Insert,
            Message::DeleteStale(_) => MessageKind::DeleteStale,
            Message::DeleteRecord(_) => MessageKind::DeleteRecord,
        }
    }

    /// The destination table, or `None` for an insert without table metadata.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Message::MigrateTable(m) => Some(&m.table_name),
            Message::Insert(m) => m.table_name().ok(),
            Message::DeleteStale(m) => Some(&m.table_name),
            Message::DeleteRecord(m) => Some(&m.table_name),
        }
    }
}

impl From<MigrateTable> for Message {
    fn from(message: MigrateTable) -> Self {
        Message::MigrateTable(message)
    }
}

impl From<Insert> for Message {
    fn from(message: Insert) -> Self {
        Message::Insert(message)
    }
}

impl From<DeleteStale> for Message {
    fn from(message: DeleteStale) -> Self {
        Message::DeleteStale(message)
    }
}

impl From<DeleteRecord> for Message {
    fn from(message: DeleteRecord) -> Self {
        Message::DeleteRecord(message)
    }
}

impl Measured for Insert {
    fn rows(&self) -> usize {
        self.record.num_rows()
    }

    fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Batchable for Insert {
    fn kind(&self) -> MessageKind {
        MessageKind::Insert
    }

    fn validate(&self) -> Result<(), WriterError> {
        self.table_name().map(|_| ())
    }

    fn split(self, cap: Cap) -> Split<Self> {
        split_record(self.record, cap).map(Insert::new)
    }
}

/// Non-insert messages weigh one row and no bytes.
macro_rules! single_row_message {
    ($($ty:ident),+) => {
        $(
            impl Measured for $ty {
                fn rows(&self) -> usize {
                    1
                }

                fn bytes(&self) -> usize {
                    0
                }
            }

            impl Batchable for $ty {
                fn kind(&self) -> MessageKind {
                    MessageKind::$ty
                }
            }
        )+
    };
}

single_row_message!(MigrateTable, DeleteStale, DeleteRecord);

impl Measured for Message {
    fn rows(&self) -> usize {
        match self {
            Message::Insert(m) => m.rows(),
            _ => 1,
        }
    }

    fn bytes(&self) -> usize {
        match self {
            Message::Insert(m) => m.bytes(),
            _ => 0,
        }
    }
}

impl Batchable for Message {
    fn kind(&self) -> MessageKind {
        Message::kind(self)
    }

    fn validate(&self) -> Result<(), WriterError> {
        match self {
            Message::Insert(insert) => insert.validate(),
            _ => Ok(()),
        }
    }

    fn split(self, cap: Cap) -> Split<Self> {
        match self {
            Message::Insert(insert) => insert.split(cap).map(Message::Insert),
            other => split_single(other, cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn users_batch(num_rows: usize) -> RecordBatch {
        let schema = record::with_table_name(
            Schema::new(vec![Field::new("id", DataType::Int64, false)]),
            "users",
        );
        let ids: Vec<i64> = (0..num_rows as i64).collect();
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(ids))]).unwrap()
    }

    fn delete_stale() -> DeleteStale {
        DeleteStale {
            table_name: "users".into(),
            source_name: "postgres".into(),
            sync_time: Utc::now(),
        }
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(MessageKind::MigrateTable.to_string(), "migrate_table");
        assert_eq!(MessageKind::Insert.to_string(), "insert");
        assert_eq!(MessageKind::DeleteStale.to_string(), "delete_stale");
        assert_eq!(MessageKind::DeleteRecord.to_string(), "delete_record");
    }

    #[test]
    fn test_insert_resolves_table_from_metadata() {
        let insert = Insert::new(users_batch(4));
        assert_eq!(insert.table_name().unwrap(), "users");
        assert_eq!(insert.rows(), 4);
        assert_eq!(insert.bytes(), 32);

        let message = Message::from(insert);
        assert_eq!(message.table_name(), Some("users"));
        assert_eq!(message.kind(), MessageKind::Insert);
    }

    #[test]
    fn test_insert_without_table_is_rejected() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch =
            RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(vec![1]))])
                .unwrap();
        let insert = Insert::new(batch);

        assert!(matches!(
            insert.table_name(),
            Err(WriterError::MissingTableName)
        ));
        assert!(matches!(
            insert.validate(),
            Err(WriterError::MissingTableName)
        ));

        let message = Message::from(insert);
        assert_eq!(message.table_name(), None);
        assert!(matches!(
            message.validate(),
            Err(WriterError::MissingTableName)
        ));
        assert!(Message::from(delete_stale()).validate().is_ok());
    }

    #[test]
    fn test_other_kinds_carry_table_directly() {
        let schema = users_batch(0).schema();
        let migrate = Message::from(MigrateTable::new("users", schema).forced());
        assert_eq!(migrate.table_name(), Some("users"));
        assert_eq!(migrate.kind(), MessageKind::MigrateTable);

        let delete = Message::from(DeleteRecord {
            table_name: "orders".into(),
            table_relations: vec![TableRelation {
                table_name: "order_items".into(),
                parent_table: "orders".into(),
            }],
            keys: users_batch(2),
        });
        assert_eq!(delete.table_name(), Some("orders"));
        assert_eq!(delete.rows(), 1);
        assert_eq!(delete.bytes(), 0);
    }

    #[test]
    fn test_insert_split_remeasures_pieces() {
        let split = Insert::new(users_batch(10)).split(Cap::new(0, 4));

        let rows: Vec<usize> = split
            .to_append
            .iter()
            .chain(&split.to_flush)
            .chain(&split.remainder)
            .map(Measured::rows)
            .collect();
        assert_eq!(rows, vec![4, 4, 2]);
        assert_eq!(split.to_flush[0].bytes(), 32);
        assert_eq!(split.to_flush[0].table_name().unwrap(), "users");
    }

    #[test]
    fn test_single_row_messages_defer_on_full_cap() {
        let mut cap = Cap::new(0, 2);
        let split = Message::from(delete_stale()).split(cap);
        assert!(split.to_append.is_some());

        cap.add_rows(2);
        let split = Message::from(delete_stale()).split(cap);
        assert!(split.to_append.is_none());
        assert!(split.remainder.is_some());
    }

    #[test]
    fn test_message_split_delegates_for_inserts() {
        let split = Message::from(Insert::new(users_batch(9))).split(Cap::new(0, 3));
        assert_eq!(split.pieces(), 3);
        assert_eq!(split.rows(), 9);
        assert!(
            split
                .to_flush
                .iter()
                .all(|m| m.kind() == MessageKind::Insert)
        );
    }
}
