//! Arrow table assembly and shared column utilities.
//!
//! Every normalized table in this crate is an Arrow [`RecordBatch`]. This
//! module centralizes the conventions the schema cases rely on:
//!
//! - [`Columns`] builds a batch from ordered named columns of the four
//!   semantic types (integer ID, float, text, timestamp) plus durations.
//! - The time column is always named [`TIME_COLUMN`] and typed
//!   `Timestamp(Millisecond, None)` with UTC semantics; invalid samples
//!   are nulls.
//! - [`decode_yyyymmddhhmm`] maps the raw CHS float encoding (for
//!   example `199209011230.0`) to epoch milliseconds, coercing invalid
//!   values to `None`.
//! - [`sort_batch`] lexicographically sorts a batch by named key columns
//!   with nulls last, the order contract for full-resolution tables.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, DurationMillisecondArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use arrow::compute::{self, SortColumn, SortOptions};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, TimeZone, Utc};

/// Reserved name of the timestamp column.
pub const TIME_COLUMN: &str = "yyyymmddHHMM";

/// Name of the entity-key column for time-series-capable files.
pub const STORM_ID: &str = "Storm ID";

/// Decimal precision applied to numeric range bounds.
pub const RANGE_DECIMALS: i32 = 6;

/// Round to [`RANGE_DECIMALS`] decimal places; non-finite values pass through.
pub fn round_bound(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let scale = 10f64.powi(RANGE_DECIMALS);
    (x * scale).round() / scale
}

/// Decode one raw `yyyymmddHHMM` float into epoch milliseconds.
///
/// The raw encoding packs a calendar date into the digits of a float,
/// e.g. `199209011230.0` for 1992-09-01 12:30 UTC. Anything non-finite,
/// negative, or calendar-invalid decodes to `None` (a null sample).
pub fn decode_yyyymmddhhmm(raw: f64) -> Option<i64> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let packed = raw as i64;
    let minute = (packed % 100) as u32;
    let hour = ((packed / 100) % 100) as u32;
    let day = ((packed / 10_000) % 100) as u32;
    let month = ((packed / 1_000_000) % 100) as u32;
    let year = (packed / 100_000_000) as i32;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .map(|dt| dt.timestamp_millis())
}

/// Decode a whole raw time array, coercing invalid entries to nulls.
pub fn decode_time_array(raw: &[f64]) -> Vec<Option<i64>> {
    raw.iter().map(|&v| decode_yyyymmddhhmm(v)).collect()
}

/// Ordered builder for a [`RecordBatch`] from named, typed columns.
#[derive(Debug, Default)]
pub struct Columns {
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
}

impl Columns {
    /// Start an empty column set.
    pub fn new() -> Self {
        Columns::default()
    }

    /// Append an integer ID column.
    pub fn push_int(&mut self, name: impl Into<String>, values: Vec<i64>) {
        self.fields
            .push(Field::new(name.into(), DataType::Int64, false));
        self.arrays.push(Arc::new(Int64Array::from(values)));
    }

    /// Append a float column; NaN marks a missing value.
    pub fn push_float(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.fields
            .push(Field::new(name.into(), DataType::Float64, false));
        self.arrays.push(Arc::new(Float64Array::from(values)));
    }

    /// Append a text column.
    pub fn push_text(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.fields
            .push(Field::new(name.into(), DataType::Utf8, false));
        self.arrays.push(Arc::new(StringArray::from(values)));
    }

    /// Append a millisecond timestamp column; `None` marks not-a-time.
    pub fn push_time(&mut self, name: impl Into<String>, values: Vec<Option<i64>>) {
        self.fields.push(Field::new(
            name.into(),
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ));
        self.arrays
            .push(Arc::new(TimestampMillisecondArray::from(values)));
    }

    /// Append a millisecond duration column.
    pub fn push_duration(&mut self, name: impl Into<String>, values: Vec<Option<i64>>) {
        self.fields.push(Field::new(
            name.into(),
            DataType::Duration(TimeUnit::Millisecond),
            true,
        ));
        self.arrays
            .push(Arc::new(DurationMillisecondArray::from(values)));
    }

    /// Append an already-built array under an existing field definition.
    pub fn push_array(&mut self, field: Field, array: ArrayRef) {
        self.fields.push(field);
        self.arrays.push(array);
    }

    /// Number of columns pushed so far.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no column has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Assemble the batch. Column lengths must agree.
    pub fn finish(self) -> Result<RecordBatch, ArrowError> {
        let schema = Arc::new(Schema::new(self.fields));
        RecordBatch::try_new(schema, self.arrays)
    }
}

/// Broadcast one scalar into a column of `n` identical values.
pub fn repeat_i64(value: i64, n: usize) -> Vec<i64> {
    vec![value; n]
}

/// Broadcast one scalar into a column of `n` identical values.
pub fn repeat_f64(value: f64, n: usize) -> Vec<f64> {
    vec![value; n]
}

/// Broadcast one scalar into a column of `n` identical values.
pub fn repeat_text(value: &str, n: usize) -> Vec<String> {
    vec![value.to_string(); n]
}

/// Look up a column index by name.
pub fn column_index(batch: &RecordBatch, name: &str) -> Option<usize> {
    batch.schema().index_of(name).ok()
}

/// Read a numeric column (`Int64` or `Float64`) as floats.
///
/// Returns `None` when the column is absent or non-numeric.
pub fn float_values(batch: &RecordBatch, name: &str) -> Option<Vec<f64>> {
    let col = batch.column_by_name(name)?;
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        return Some(arr.values().to_vec());
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return Some(arr.values().iter().map(|&v| v as f64).collect());
    }
    None
}

/// Borrow a column as an `Int64Array`, if present and integer-typed.
pub fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int64Array> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<Int64Array>()
}

/// Borrow a column as a millisecond timestamp array, if present.
pub fn time_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a TimestampMillisecondArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
}

/// Convert a `DateTime<Utc>` to the column's millisecond representation.
pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert column milliseconds back to a `DateTime<Utc>`.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Lexicographically sort a batch by the named key columns, nulls last.
///
/// Key names absent from the batch are skipped; with no usable key the
/// batch is returned unchanged. The sort is stable, so previously
/// established orderings survive as tie-breaks.
pub fn sort_batch(batch: &RecordBatch, keys: &[&str]) -> Result<RecordBatch, ArrowError> {
    let sort_columns: Vec<SortColumn> = keys
        .iter()
        .filter_map(|key| {
            batch.column_by_name(key).map(|col| SortColumn {
                values: col.clone(),
                options: Some(SortOptions {
                    descending: false,
                    nulls_first: false,
                }),
            })
        })
        .collect();
    if sort_columns.is_empty() || batch.num_rows() == 0 {
        return Ok(batch.clone());
    }
    let indices = compute::lexsort_to_indices(&sort_columns, None)?;
    let columns = batch
        .columns()
        .iter()
        .map(|col| compute::take(col.as_ref(), &indices, None))
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(batch.schema(), columns)
}

/// Concatenate row-compatible batches into one.
pub fn concat_batches(batches: &[RecordBatch]) -> Result<RecordBatch, ArrowError> {
    let schema = batches
        .first()
        .map(|b| b.schema())
        .ok_or_else(|| ArrowError::ComputeError("cannot concatenate zero batches".to_string()))?;
    compute::concat_batches(&schema, batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_valid_timestamp() {
        let ms = decode_yyyymmddhhmm(199209011230.0).expect("valid");
        let dt = from_millis(ms).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(1992, 9, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn decode_coerces_invalid_to_none() {
        assert_eq!(decode_yyyymmddhhmm(f64::NAN), None);
        assert_eq!(decode_yyyymmddhhmm(-1.0), None);
        // Month 13 is not a calendar date.
        assert_eq!(decode_yyyymmddhhmm(199213011230.0), None);
    }

    #[test]
    fn round_bound_six_decimals() {
        assert_eq!(round_bound(1.23456789), 1.234568);
        assert_eq!(round_bound(-0.0000004), -0.0);
        assert!(round_bound(f64::NAN).is_nan());
    }

    #[test]
    fn columns_build_a_batch() {
        let mut cols = Columns::new();
        cols.push_int("id", vec![1, 2]);
        cols.push_float("v", vec![0.5, f64::NAN]);
        cols.push_text("name", vec!["a".to_string(), "b".to_string()]);
        cols.push_time("ts", vec![Some(1_000), None]);
        let batch = cols.finish().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        assert_eq!(float_values(&batch, "id").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn sort_batch_orders_by_keys_with_nulls_last() {
        let mut cols = Columns::new();
        cols.push_int(STORM_ID, vec![2, 1, 1, 2]);
        cols.push_time(
            TIME_COLUMN,
            vec![Some(30), Some(20), None, Some(10)],
        );
        let batch = cols.finish().unwrap();
        let sorted = sort_batch(&batch, &[STORM_ID, TIME_COLUMN]).unwrap();
        let ids: Vec<i64> = int_column(&sorted, STORM_ID).unwrap().values().to_vec();
        assert_eq!(ids, vec![1, 1, 2, 2]);
        let ts = time_column(&sorted, TIME_COLUMN).unwrap();
        assert_eq!(ts.value(0), 20);
        assert!(ts.is_null(1));
        assert_eq!(ts.value(2), 10);
        assert_eq!(ts.value(3), 30);
    }

    #[test]
    fn sort_batch_without_keys_is_identity() {
        let mut cols = Columns::new();
        cols.push_float("v", vec![3.0, 1.0]);
        let batch = cols.finish().unwrap();
        let sorted = sort_batch(&batch, &["missing"]).unwrap();
        assert_eq!(sorted, batch);
    }
}
