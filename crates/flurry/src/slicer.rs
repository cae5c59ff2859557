//! Carving records into pieces that respect a [`Cap`].
//!
//! Given a record and the current budget, [`split_record`] returns:
//!
//! - `to_append`: the prefix that still fits in the batch being built
//! - `to_flush`: full-size pieces, each a complete batch on its own
//! - `remainder`: the tail that starts the next batch
//!
//! Every row of the input lands in exactly one piece, in order. Sizes come
//! from one per-record average (`approx_byte_size / rows`), so a piece can
//! exceed the true byte limit when row widths vary a lot.

use arrow::array::RecordBatch;

use crate::cap::Cap;
use crate::record::{Measured, approx_byte_size};

/// The pieces a message was carved into.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    pub to_append: Option<T>,
    pub to_flush: Vec<T>,
    pub remainder: Option<T>,
}

impl<T> Split<T> {
    /// Nothing to do.
    pub fn empty() -> Self {
        Self {
            to_append: None,
            to_flush: Vec::new(),
            remainder: None,
        }
    }

    /// The whole item joins the current batch.
    pub fn whole(item: T) -> Self {
        Self {
            to_append: Some(item),
            ..Self::empty()
        }
    }

    /// The whole item waits for the next batch.
    pub fn deferred(item: T) -> Self {
        Self {
            remainder: Some(item),
            ..Self::empty()
        }
    }

    /// Apply `f` to every piece, keeping their roles.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Split<U> {
        Split {
            to_append: self.to_append.map(&mut f),
            to_flush: self.to_flush.into_iter().map(&mut f).collect(),
            remainder: self.remainder.map(f),
        }
    }

    /// Number of pieces produced.
    pub fn pieces(&self) -> usize {
        usize::from(self.to_append.is_some())
            + self.to_flush.len()
            + usize::from(self.remainder.is_some())
    }
}

impl<T: Measured> Split<T> {
    /// Rows across all pieces.
    pub fn rows(&self) -> usize {
        self.to_append.as_ref().map_or(0, T::rows)
            + self.to_flush.iter().map(T::rows).sum::<usize>()
            + self.remainder.as_ref().map_or(0, T::rows)
    }
}

/// Carve `record` against `cap`.
///
/// The budget is taken by value: the caller applies the returned pieces to its
/// own `Cap`.
pub fn split_record(record: RecordBatch, cap: Cap) -> Split<RecordBatch> {
    let total_rows = record.num_rows();
    if total_rows == 0 {
        return Split::empty();
    }
    let bytes_per_row = approx_byte_size(&record) / total_rows;

    let mut offset = match cap.remaining_rows(bytes_per_row) {
        None => return Split::whole(record),
        Some(fits) if fits >= total_rows => return Split::whole(record),
        Some(fits) => fits,
    };
    let to_append = (offset > 0).then(|| record.slice(0, offset));

    // A cap smaller than one row still moves one row per batch.
    let chunk = cap
        .total_rows(bytes_per_row)
        .unwrap_or(total_rows)
        .max(1);

    let mut to_flush = Vec::with_capacity((total_rows - offset) / chunk);
    while total_rows - offset >= chunk {
        to_flush.push(record.slice(offset, chunk));
        offset += chunk;
    }

    let remainder = (offset < total_rows).then(|| record.slice(offset, total_rows - offset));

    Split {
        to_append,
        to_flush,
        remainder,
    }
}

/// Place an indivisible, single-row item against `cap`.
///
/// It joins the current batch unless the row budget is exhausted, in which
/// case it seeds the next one.
pub fn split_single<T>(item: T, cap: Cap) -> Split<T> {
    match cap.remaining_rows(0) {
        Some(0) => Split::deferred(item),
        _ => Split::whole(item),
    }
}
