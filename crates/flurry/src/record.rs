//! Arrow record batches as sized, table-addressed records.
//!
//! The engine never looks inside a record. It only needs a row count, an
//! approximate byte footprint and the destination table, which producers
//! attach to the record's schema metadata.

use std::collections::HashMap;

use arrow::array::{Array, RecordBatch, RecordBatchOptions};
use arrow::datatypes::Schema;
use arrow::error::ArrowError;

/// Schema metadata key naming the destination table of a record.
pub const TABLE_NAME_KEY: &str = "flurry:table_name";

/// Something with a row count and an estimated byte footprint.
pub trait Measured {
    fn rows(&self) -> usize;
    fn bytes(&self) -> usize;
}

impl Measured for RecordBatch {
    fn rows(&self) -> usize {
        self.num_rows()
    }

    fn bytes(&self) -> usize {
        approx_byte_size(self)
    }
}

/// Estimate the bytes referenced by a record.
///
/// Sliced records only count the rows they cover. Variable-width columns are
/// measured as a whole, so per-row sizes derived from this are averages.
pub fn approx_byte_size(record: &RecordBatch) -> usize {
    record
        .columns()
        .iter()
        .map(|column| {
            column
                .to_data()
                .get_slice_memory_size()
                .unwrap_or_else(|_| column.get_array_memory_size())
        })
        .sum()
}

/// Destination table recorded in a schema's metadata.
pub fn table_name(schema: &Schema) -> Option<&str> {
    schema.metadata().get(TABLE_NAME_KEY).map(String::as_str)
}

/// Return `schema` addressed to `table`, keeping any other metadata.
pub fn with_table_name(schema: Schema, table: impl Into<String>) -> Schema {
    let mut metadata: HashMap<String, String> = schema.metadata().clone();
    metadata.insert(TABLE_NAME_KEY.to_string(), table.into());
    schema.with_metadata(metadata)
}

/// Readdress `record` to `table` without copying its columns.
pub fn addressed_to(
    record: RecordBatch,
    table: impl Into<String>,
) -> Result<RecordBatch, ArrowError> {
    let schema = with_table_name(record.schema().as_ref().clone(), table);
    let options = RecordBatchOptions::new().with_row_count(Some(record.num_rows()));
    RecordBatch::try_new_with_options(schema.into(), record.columns().to_vec(), &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use std::sync::Arc;

    fn int_batch(num_rows: usize) -> RecordBatch {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let values: Vec<i64> = (0..num_rows as i64).collect();
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_fixed_width_size_is_exact() {
        let batch = int_batch(100);
        assert_eq!(approx_byte_size(&batch), 800);
        assert_eq!(batch.bytes(), 800);
        assert_eq!(batch.rows(), 100);
    }

    #[test]
    fn test_slices_count_only_their_rows() {
        let batch = int_batch(100);
        let slice = batch.slice(10, 25);
        assert_eq!(approx_byte_size(&slice), 200);
    }

    #[test]
    fn test_variable_width_columns_are_counted() {
        let schema = Schema::new(vec![Field::new("name", DataType::Utf8, false)]);
        let names = StringArray::from(vec!["a", "bbbbbbbbbb"]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(names)]).unwrap();

        assert!(approx_byte_size(&batch) >= 11);
        assert!(approx_byte_size(&batch.slice(1, 1)) > approx_byte_size(&batch.slice(0, 1)));
    }

    #[test]
    fn test_table_name_round_trip_keeps_other_metadata() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]).with_metadata(
            HashMap::from([("owner".to_string(), "sync".to_string())]),
        );
        assert_eq!(table_name(&schema), None);

        let schema = with_table_name(schema, "users");
        assert_eq!(table_name(&schema), Some("users"));
        assert_eq!(schema.metadata().get("owner").map(String::as_str), Some("sync"));
    }

    #[test]
    fn test_addressed_to_replaces_table() {
        let batch = addressed_to(int_batch(3), "users").unwrap();
        assert_eq!(table_name(&batch.schema()), Some("users"));

        let batch = addressed_to(batch, "orders").unwrap();
        assert_eq!(table_name(&batch.schema()), Some("orders"));
        assert_eq!(batch.num_rows(), 3);
    }
}
