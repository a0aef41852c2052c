//! Interactive narrowing over one converted dataset.
//!
//! A [`FilterEngine`] borrows a [`ConvertedDataset`] and owns the mutable
//! view state: the current row subset, the live range map, and the
//! optional selected storm. The dataset itself is never mutated, so
//! clearing always restores the original view exactly.
//!
//! Bounds are inclusive on both ends and applied with arrow's scalar
//! comparison kernels, so no bound column is ever materialized. After a
//! range filter the bounds of every *other* tracked variable are
//! recomputed against the surviving rows; variables that become wholly
//! missing or degenerate drop out of the map rather than keeping stale
//! bounds.

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, Scalar};
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::compute::{filter_record_batch, is_not_null};
use arrow::datatypes::{DataType, Field, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::ranges::{self, RangeBound, VariableRanges};
use crate::table::{self, Columns, STORM_ID, TIME_COLUMN};

/// Output column of synthesized per-storm step indices.
pub const TIME_STEP: &str = "Time Step";
/// Output column of decoded timestamps in plot series.
pub const DATE_TIME: &str = "Date-Time";

/// Rejected filter or plot operations.
#[derive(Debug, Snafu)]
pub enum FilterError {
    /// A storm filter was requested on a dataset without storms.
    #[snafu(display("Storm selection requires a time-series dataset"))]
    NotTimeSeries,

    /// A storm is already selected; clear filters before re-selecting.
    #[snafu(display("A storm is already selected; clear filters first"))]
    StormAlreadySelected,

    /// A range filter names a variable with no computed range.
    #[snafu(display("Variable {variable} has no filterable range"))]
    UnknownVariable {
        /// The requested variable.
        variable: String,
    },

    /// The bound's type does not match the variable's column.
    #[snafu(display("Bound type does not match column {variable}"))]
    BoundMismatch {
        /// The requested variable.
        variable: String,
    },

    /// Split parents carry no table to filter; use their children.
    #[snafu(display("Split datasets hold no rows; filter a child instead"))]
    SplitDataset,

    /// A plot needs at least one selected storm on a time series.
    #[snafu(display("Plotting a time series requires at least one storm"))]
    NoStormSelected,

    /// A column the operation depends on is absent from the table.
    #[snafu(display("Column {name} is absent from the table"))]
    MissingColumn {
        /// The absent column.
        name: String,
    },

    /// Arrow rejected a kernel invocation.
    #[snafu(display("Arrow error while filtering: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Mutable query view over one immutable [`ConvertedDataset`].
#[derive(Debug)]
pub struct FilterEngine<'a> {
    dataset: &'a ConvertedDataset,
    current: RecordBatch,
    ranges: VariableRanges,
    active_storm: Option<i64>,
}

impl<'a> FilterEngine<'a> {
    /// Open a view over a non-split dataset.
    pub fn new(dataset: &'a ConvertedDataset) -> Result<Self, FilterError> {
        let backing = dataset.backing_table().context(SplitDatasetSnafu)?;
        Ok(FilterEngine {
            dataset,
            current: backing.clone(),
            ranges: dataset.variable_ranges().clone(),
            active_storm: None,
        })
    }

    /// The rows the view currently shows.
    pub fn current(&self) -> &RecordBatch {
        &self.current
    }

    /// The live range map, narrowed by previous filters.
    pub fn ranges(&self) -> &VariableRanges {
        &self.ranges
    }

    /// The selected storm, if a storm filter is active.
    pub fn active_storm(&self) -> Option<i64> {
        self.active_storm
    }

    /// The dataset this view was opened over.
    pub fn dataset(&self) -> &ConvertedDataset {
        self.dataset
    }

    /// Narrow the view to one storm's samples, time-ordered, and merge
    /// that storm's range map in for subsequent narrowing.
    pub fn apply_storm_filter(&mut self, storm_id: i64) -> Result<(), FilterError> {
        ensure!(self.dataset.is_time_series, NotTimeSeriesSnafu);
        ensure!(self.active_storm.is_none(), StormAlreadySelectedSnafu);
        let full = self
            .dataset
            .full_table()
            .context(SplitDatasetSnafu)?;

        let subset = rows_for_storm(full, storm_id)?;
        self.current = table::sort_batch(&subset, &[TIME_COLUMN]).context(ArrowSnafu)?;
        if let Some(storm_ranges) = self.dataset.storm_ranges(&storm_id.to_string()) {
            for (name, bound) in storm_ranges {
                self.ranges.insert(name.clone(), bound.clone());
            }
        }
        self.active_storm = Some(storm_id);
        Ok(())
    }

    /// Keep rows with `min <= value <= max` for one variable.
    ///
    /// `use_full` restarts from the full table of a time series instead
    /// of narrowing the current view. Filtering the timestamp column
    /// first drops rows with no valid timestamp.
    pub fn apply_range_filter(
        &mut self,
        variable: &str,
        bound: &RangeBound,
        use_full: bool,
    ) -> Result<(), FilterError> {
        ensure!(
            self.ranges.contains_key(variable),
            UnknownVariableSnafu { variable }
        );
        let source = if use_full && self.dataset.is_time_series {
            self.dataset
                .full_table()
                .context(SplitDatasetSnafu)?
                .clone()
        } else {
            self.current.clone()
        };

        let source = if variable == TIME_COLUMN {
            drop_null_rows(&source, TIME_COLUMN)?
        } else {
            source
        };

        let column = source
            .column_by_name(variable)
            .context(MissingColumnSnafu { name: variable })?;
        let mask = match bound {
            RangeBound::Numeric { min, max } => {
                let column = if column.data_type() == &DataType::Int64 {
                    arrow::compute::cast(column, &DataType::Float64).context(ArrowSnafu)?
                } else {
                    column.clone()
                };
                ensure!(
                    column.data_type() == &DataType::Float64,
                    BoundMismatchSnafu { variable }
                );
                let lo = Scalar::new(Float64Array::from(vec![*min]));
                let hi = Scalar::new(Float64Array::from(vec![*max]));
                let ge = cmp_kernels::gt_eq(&column, &lo).context(ArrowSnafu)?;
                let le = cmp_kernels::lt_eq(&column, &hi).context(ArrowSnafu)?;
                boolean_kernels::and(&ge, &le).context(ArrowSnafu)?
            }
            RangeBound::Time { min, max } => {
                ensure!(
                    matches!(
                        column.data_type(),
                        DataType::Timestamp(TimeUnit::Millisecond, None)
                    ),
                    BoundMismatchSnafu { variable }
                );
                let lo = timestamp_scalar(*min);
                let hi = timestamp_scalar(*max);
                let ge = cmp_kernels::gt_eq(column, &lo).context(ArrowSnafu)?;
                let le = cmp_kernels::lt_eq(column, &hi).context(ArrowSnafu)?;
                boolean_kernels::and(&ge, &le).context(ArrowSnafu)?
            }
        };
        let filtered = filter_record_batch(&source, &mask).context(ArrowSnafu)?;

        // Refresh every other variable's bounds against the survivors.
        let mut refreshed = VariableRanges::new();
        for (name, old) in &self.ranges {
            if name == variable {
                refreshed.insert(name.clone(), old.clone());
                continue;
            }
            let recomputed = if name == TIME_COLUMN {
                table::time_column(&filtered, name)
                    .and_then(ranges::timestamp_range)
                    .map(|(min, max)| RangeBound::Time { min, max })
            } else {
                ranges::numeric_range(&filtered, name)
                    .map(|(min, max)| RangeBound::Numeric { min, max })
            };
            if let Some(bound) = recomputed {
                refreshed.insert(name.clone(), bound);
            }
        }
        self.ranges = refreshed;
        self.current = filtered;
        Ok(())
    }

    /// Restore the unfiltered view: original rows, original ranges, no
    /// selected storm. Idempotent.
    pub fn clear_filters(&mut self) {
        // backing_table() existed at construction.
        if let Some(backing) = self.dataset.backing_table() {
            self.current = backing.clone();
        }
        self.ranges = self.dataset.variable_ranges().clone();
        self.active_storm = None;
    }

    /// Extract plottable series data for one variable.
    ///
    /// With more than one storm the result has three columns
    /// ([`TIME_STEP`], [`STORM_ID`], variable), ordered by storm then
    /// time, with the step index restarting at 1 per storm. Otherwise the
    /// result pairs the variable with [`DATE_TIME`], or with [`STORM_ID`]
    /// in `single_timestamp` mode (used when the time axis collapses to
    /// one instant). `window` bounds the timestamps inclusively.
    pub fn plot_series(
        &self,
        variable: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        storm_ids: &[i64],
        single_timestamp: bool,
    ) -> Result<RecordBatch, FilterError> {
        if self.dataset.is_time_series && storm_ids.len() > 1 {
            return self.multi_storm_series(variable, storm_ids);
        }

        let base = if self.dataset.is_time_series {
            let id = *storm_ids.first().context(NoStormSelectedSnafu)?;
            let full = self.dataset.full_table().context(SplitDatasetSnafu)?;
            rows_for_storm(full, id)?
        } else {
            self.dataset
                .normal_table()
                .context(SplitDatasetSnafu)?
                .clone()
        };
        let base = table::sort_batch(&base, &[STORM_ID, TIME_COLUMN]).context(ArrowSnafu)?;
        let base = drop_null_rows(&base, TIME_COLUMN)?;
        let base = match window {
            Some((min, max)) => {
                let column = base
                    .column_by_name(TIME_COLUMN)
                    .context(MissingColumnSnafu { name: TIME_COLUMN })?;
                let ge =
                    cmp_kernels::gt_eq(column, &timestamp_scalar(min)).context(ArrowSnafu)?;
                let le =
                    cmp_kernels::lt_eq(column, &timestamp_scalar(max)).context(ArrowSnafu)?;
                let mask = boolean_kernels::and(&ge, &le).context(ArrowSnafu)?;
                filter_record_batch(&base, &mask).context(ArrowSnafu)?
            }
            None => base,
        };

        let value = named_column(&base, variable)?;
        let mut out = Columns::new();
        if single_timestamp {
            let (field, ids) = named_column(&base, STORM_ID)?;
            out.push_array(field, ids);
        } else {
            let (field, times) = named_column(&base, TIME_COLUMN)?;
            out.push_array(field.with_name(DATE_TIME), times);
        }
        out.push_array(value.0, value.1);
        out.finish().context(ArrowSnafu)
    }

    fn multi_storm_series(
        &self,
        variable: &str,
        storm_ids: &[i64],
    ) -> Result<RecordBatch, FilterError> {
        let full = self.dataset.full_table().context(SplitDatasetSnafu)?;
        let ids = table::int_column(full, STORM_ID)
            .context(MissingColumnSnafu { name: STORM_ID })?;

        // One equality mask per chosen storm, or-ed together.
        let mut mask = None;
        for &id in storm_ids {
            let eq = cmp_kernels::eq(ids, &Scalar::new(Int64Array::from(vec![id])))
                .context(ArrowSnafu)?;
            mask = Some(match mask {
                None => eq,
                Some(acc) => boolean_kernels::or(&acc, &eq).context(ArrowSnafu)?,
            });
        }
        let mask = mask.context(NoStormSelectedSnafu)?;
        let subset = filter_record_batch(full, &mask).context(ArrowSnafu)?;
        let subset =
            table::sort_batch(&subset, &[STORM_ID, TIME_COLUMN]).context(ArrowSnafu)?;

        // Synthesize per-storm step indices over the sorted rows.
        let sorted_ids = table::int_column(&subset, STORM_ID)
            .context(MissingColumnSnafu { name: STORM_ID })?;
        let mut steps = Vec::with_capacity(subset.num_rows());
        let mut prev: Option<i64> = None;
        let mut step = 0i64;
        for i in 0..sorted_ids.len() {
            let id = sorted_ids.value(i);
            step = if prev == Some(id) { step + 1 } else { 1 };
            prev = Some(id);
            steps.push(step);
        }

        let mut out = Columns::new();
        out.push_int(TIME_STEP, steps);
        let (id_field, id_col) = named_column(&subset, STORM_ID)?;
        out.push_array(id_field, id_col);
        let (val_field, val_col) = named_column(&subset, variable)?;
        out.push_array(val_field, val_col);
        out.finish().context(ArrowSnafu)
    }
}

/// Rows of `batch` whose storm-ID column equals `storm_id`.
fn rows_for_storm(batch: &RecordBatch, storm_id: i64) -> Result<RecordBatch, FilterError> {
    let ids = table::int_column(batch, STORM_ID)
        .context(MissingColumnSnafu { name: STORM_ID })?;
    let eq = cmp_kernels::eq(ids, &Scalar::new(Int64Array::from(vec![storm_id])))
        .context(ArrowSnafu)?;
    filter_record_batch(batch, &eq).context(ArrowSnafu)
}

/// Drop rows where the named column is null; absent column is a no-op.
fn drop_null_rows(batch: &RecordBatch, name: &str) -> Result<RecordBatch, FilterError> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(batch.clone());
    };
    let mask = is_not_null(column).context(ArrowSnafu)?;
    filter_record_batch(batch, &mask).context(ArrowSnafu)
}

/// A one-element millisecond timestamp scalar.
fn timestamp_scalar(at: DateTime<Utc>) -> Scalar<arrow::array::TimestampMillisecondArray> {
    Scalar::new(arrow::array::TimestampMillisecondArray::from(vec![
        table::to_millis(at),
    ]))
}

/// Borrow a column together with its field definition.
fn named_column(batch: &RecordBatch, name: &str) -> Result<(Field, ArrayRef), FilterError> {
    let index = table::column_index(batch, name).context(MissingColumnSnafu { name })?;
    Ok((
        batch.schema().field(index).clone(),
        batch.column(index).clone(),
    ))
}
