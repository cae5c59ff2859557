//! Byte and row budget for one batch.
//!
//! A `Cap` tracks how much has been accumulated against two independent
//! limits. A limit of `0` means that dimension is unlimited; queries that
//! would otherwise report "no limit" return `None`.
//!
//! `Cap` is `Copy`. Code that only needs to reason about the budget (the
//! slicer) takes it by value, so the owner's counters only move through
//! [`Cap::add_rows`], [`Cap::add_slice`], [`Cap::set`] and [`Cap::reset`].

use crate::record::Measured;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cap {
    bytes_current: usize,
    bytes_limit: usize,
    rows_current: usize,
    rows_limit: usize,
}

impl Cap {
    /// Create an empty budget. Either limit may be `0` for "unlimited".
    pub const fn new(bytes_limit: usize, rows_limit: usize) -> Self {
        Self {
            bytes_current: 0,
            bytes_limit,
            rows_current: 0,
            rows_limit,
        }
    }

    /// A budget with no limit in either dimension.
    pub const fn unlimited() -> Self {
        Self::new(0, 0)
    }

    /// True once either limited dimension is at or past its limit.
    pub fn reached_limit(&self) -> bool {
        (self.bytes_limit > 0 && self.bytes_current >= self.bytes_limit)
            || (self.rows_limit > 0 && self.rows_current >= self.rows_limit)
    }

    /// Rows accumulated so far.
    pub fn rows(&self) -> usize {
        self.rows_current
    }

    /// Bytes accumulated so far.
    pub fn bytes(&self) -> usize {
        self.bytes_current
    }

    pub fn bytes_limit(&self) -> Option<usize> {
        (self.bytes_limit > 0).then_some(self.bytes_limit)
    }

    pub fn rows_limit(&self) -> Option<usize> {
        (self.rows_limit > 0).then_some(self.rows_limit)
    }

    /// Bytes left before the byte limit, or `None` when bytes are unlimited.
    pub fn remaining(&self) -> Option<usize> {
        self.bytes_limit()
            .map(|limit| limit.saturating_sub(self.bytes_current))
    }

    /// Rows that still fit when each row costs `bytes_per_row`.
    ///
    /// The smaller of the row allowance and the byte allowance wins; `None`
    /// means neither dimension constrains the count.
    pub fn remaining_rows(&self, bytes_per_row: usize) -> Option<usize> {
        let rows_left = self
            .rows_limit()
            .map(|limit| limit.saturating_sub(self.rows_current));
        rows_within(rows_left, self.remaining(), bytes_per_row)
    }

    /// The byte limit itself, or `None` when bytes are unlimited.
    pub fn total(&self) -> Option<usize> {
        self.bytes_limit()
    }

    /// Rows that fit in an empty batch when each row costs `bytes_per_row`.
    pub fn total_rows(&self, bytes_per_row: usize) -> Option<usize> {
        rows_within(self.rows_limit(), self.total(), bytes_per_row)
    }

    pub fn add_rows(&mut self, rows: usize) {
        self.rows_current += rows;
    }

    /// Account for a piece that joined the batch.
    pub fn add_slice(&mut self, slice: &impl Measured) {
        self.rows_current += slice.rows();
        self.bytes_current += slice.bytes();
    }

    /// Overwrite both counters, keeping the limits.
    pub fn set(&mut self, bytes: usize, rows: usize) {
        self.bytes_current = bytes;
        self.rows_current = rows;
    }

    /// Zero both counters, keeping the limits.
    pub fn reset(&mut self) {
        self.set(0, 0);
    }
}

fn rows_within(
    rows_left: Option<usize>,
    bytes_left: Option<usize>,
    bytes_per_row: usize,
) -> Option<usize> {
    // Zero-width rows never exhaust a byte budget.
    let by_bytes = match bytes_per_row {
        0 => None,
        width => bytes_left.map(|bytes| bytes / width),
    };

    match (rows_left, by_bytes) {
        (Some(rows), Some(bytes)) => Some(rows.min(bytes)),
        (rows, None) => rows,
        (None, bytes) => bytes,
    }
}
