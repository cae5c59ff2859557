//! Record splitting throughput benchmarks.
//!
//! Measures how fast oversized inserts are carved into budget-sized pieces,
//! with and without a partially filled batch ahead of them.

use std::hint::black_box;
use std::sync::Arc;

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use flurry::record::{self, Measured};
use flurry::{Cap, KB, split_record};

fn events(num_rows: usize) -> RecordBatch {
    let schema = record::with_table_name(
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("payload", DataType::Utf8, false),
        ]),
        "events",
    );
    let ids: Vec<i64> = (0..num_rows as i64).collect();
    let payloads: Vec<String> = ids
        .iter()
        .map(|id| format!("{{\"event\":{id},\"source\":\"bench\"}}"))
        .collect();
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(payloads)),
        ],
    )
    .unwrap()
}

fn split_by_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_by_rows");

    for num_rows in [10_000, 100_000, 1_000_000] {
        let record = events(num_rows);
        group.throughput(Throughput::Elements(num_rows as u64));

        group.bench_with_input(
            BenchmarkId::new("fresh_batch", num_rows),
            &record,
            |b, record| {
                b.iter(|| split_record(black_box(record.clone()), Cap::new(0, 1_000)).pieces());
            },
        );

        let mut partial = Cap::new(0, 1_000);
        partial.add_rows(750);
        group.bench_with_input(
            BenchmarkId::new("partial_batch", num_rows),
            &record,
            |b, record| {
                b.iter(|| split_record(black_box(record.clone()), partial).pieces());
            },
        );
    }

    group.finish();
}

fn split_by_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_by_bytes");

    for num_rows in [10_000, 100_000, 1_000_000] {
        let record = events(num_rows);
        group.throughput(Throughput::Bytes(record.bytes() as u64));

        for cap_kb in [64, 1_024] {
            group.bench_with_input(
                BenchmarkId::new(format!("cap_{cap_kb}kb"), num_rows),
                &record,
                |b, record| {
                    b.iter(|| {
                        split_record(black_box(record.clone()), Cap::new(cap_kb * KB, 0)).pieces()
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, split_by_rows, split_by_bytes);
criterion_main!(benches);
