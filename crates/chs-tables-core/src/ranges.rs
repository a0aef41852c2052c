//! Per-column range indexing for interactive filtering.
//!
//! A range index maps a column name to its inclusive `(min, max)` bounds.
//! Two gates keep the index useful for filter widgets:
//!
//! - a column whose values are entirely missing (NaN / null timestamps)
//!   is skipped, and
//! - a column with a single distinct value (`max <= min` after rounding)
//!   is considered non-filterable and omitted.
//!
//! Numeric bounds are rounded to six decimals; timestamp bounds are
//! stored unrounded. Both indexers are pure and idempotent: identical
//! input always yields identical bounds.

use std::collections::BTreeMap;

use arrow::array::{Array, RecordBatch, TimestampMillisecondArray};
use chrono::{DateTime, Utc};

use crate::table::{self, TIME_COLUMN};

/// Inclusive bounds for one filterable column.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    /// Numeric bounds, rounded to six decimals, with `min < max`.
    Numeric {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Timestamp bounds, unrounded, with `min < max`.
    Time {
        /// Inclusive lower bound.
        min: DateTime<Utc>,
        /// Inclusive upper bound.
        max: DateTime<Utc>,
    },
}

/// Ordered map from column name to its bounds.
pub type VariableRanges = BTreeMap<String, RangeBound>;

/// Index one numeric column of a batch.
///
/// The column is read as floating point (`Int64` widens). Returns `None`
/// when the column is absent, non-numeric, wholly missing, or degenerate.
pub fn numeric_range(batch: &RecordBatch, column: &str) -> Option<(f64, f64)> {
    let values = table::float_values(batch, column)?;
    numeric_range_of(&values)
}

/// Index a raw float slice; NaN entries are missing values.
pub fn numeric_range_of(values: &[f64]) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;
    for &v in values {
        if v.is_nan() {
            continue;
        }
        seen = true;
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    if !seen {
        return None;
    }
    let min = table::round_bound(min);
    let max = table::round_bound(max);
    (max > min).then_some((min, max))
}

/// Index a timestamp array, skipping not-a-time (null) entries.
pub fn timestamp_range(array: &TimestampMillisecondArray) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    let mut seen = false;
    for i in 0..array.len() {
        if array.is_null(i) {
            continue;
        }
        let v = array.value(i);
        seen = true;
        min = min.min(v);
        max = max.max(v);
    }
    if !seen || max <= min {
        return None;
    }
    Some((table::from_millis(min)?, table::from_millis(max)?))
}

/// Index the named candidate columns of a batch.
///
/// The reserved [`TIME_COLUMN`] is indexed as a timestamp; every other
/// candidate as numeric. Candidates absent from the batch, wholly
/// missing, or degenerate are silently skipped.
pub fn index_columns<'a>(
    batch: &RecordBatch,
    candidates: impl IntoIterator<Item = &'a str>,
) -> VariableRanges {
    let mut ranges = VariableRanges::new();
    for name in candidates {
        if name == TIME_COLUMN {
            if let Some(array) = table::time_column(batch, name) {
                if let Some((min, max)) = timestamp_range(array) {
                    ranges.insert(name.to_string(), RangeBound::Time { min, max });
                }
            }
        } else if let Some((min, max)) = numeric_range(batch, name) {
            ranges.insert(name.to_string(), RangeBound::Numeric { min, max });
        }
    }
    ranges
}
