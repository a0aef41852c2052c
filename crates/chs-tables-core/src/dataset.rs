//! The converted-dataset value object.
//!
//! A [`ConvertedDataset`] is the single self-contained result of one
//! conversion: the normalized table, the optional full-resolution table,
//! the range indexes, and the metadata flags. It is immutable once built;
//! interactive narrowing happens in a separate
//! [`FilterEngine`](crate::filter::FilterEngine) view so that no hidden
//! state accumulates on the dataset itself.
//!
//! Split sources (`Locations`, AEF-v2) produce a parent that carries no
//! table data of its own, only ordered `children`.

use std::collections::BTreeMap;

use arrow::array::RecordBatch;

use crate::ranges::VariableRanges;
use crate::table::{self, STORM_ID};

/// The tables of a non-split dataset.
#[derive(Debug, Clone)]
pub struct DatasetTables {
    /// One row per logical entity (save point, storm, grouped sample).
    pub normal: RecordBatch,
    /// One row per raw time sample; present for time-series cases only.
    pub full: Option<RecordBatch>,
}

/// Per-storm range indexes, keyed by the decimal text of the storm ID.
pub type StormRanges = BTreeMap<String, VariableRanges>;

/// The normalized result of converting one CHS source file (or one child
/// of a split source).
#[derive(Debug, Clone)]
pub struct ConvertedDataset {
    /// Dataset name: the file stem, `^`-suffixed for split children.
    pub name: String,
    /// The identity type tag that selected the schema case.
    pub type_tag: String,
    /// True for `Timeseries` datasets (a full table exists).
    pub is_time_series: bool,
    /// True when the dataset supports plotting (`Peaks`, `Timeseries`).
    pub is_plottable: bool,
    /// True when this is a split parent carrying only children.
    pub is_split: bool,
    tables: Option<DatasetTables>,
    variable_ranges: VariableRanges,
    ranges_by_storm: StormRanges,
    children: Vec<ConvertedDataset>,
}

impl ConvertedDataset {
    /// Build a plain dataset with only a normal table.
    pub fn from_normal(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        normal: RecordBatch,
        variable_ranges: VariableRanges,
    ) -> Self {
        ConvertedDataset {
            name: name.into(),
            type_tag: type_tag.into(),
            is_time_series: false,
            is_plottable: false,
            is_split: false,
            tables: Some(DatasetTables { normal, full: None }),
            variable_ranges,
            ranges_by_storm: StormRanges::new(),
            children: Vec::new(),
        }
    }

    /// Build a time-series dataset with both tables and per-storm ranges.
    pub fn time_series(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        normal: RecordBatch,
        full: RecordBatch,
        variable_ranges: VariableRanges,
        ranges_by_storm: StormRanges,
    ) -> Self {
        ConvertedDataset {
            name: name.into(),
            type_tag: type_tag.into(),
            is_time_series: true,
            is_plottable: true,
            is_split: false,
            tables: Some(DatasetTables {
                normal,
                full: Some(full),
            }),
            variable_ranges,
            ranges_by_storm,
            children: Vec::new(),
        }
    }

    /// Build a split parent from its ordered children.
    pub fn split(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        children: Vec<ConvertedDataset>,
    ) -> Self {
        ConvertedDataset {
            name: name.into(),
            type_tag: type_tag.into(),
            is_time_series: false,
            is_plottable: false,
            is_split: true,
            tables: None,
            variable_ranges: VariableRanges::new(),
            ranges_by_storm: StormRanges::new(),
            children,
        }
    }

    /// Mark the dataset as plottable (`Peaks` via the Universal case).
    pub fn with_plottable(mut self, plottable: bool) -> Self {
        self.is_plottable = plottable;
        self
    }

    /// The normal (one row per entity) table. `None` for split parents.
    pub fn normal_table(&self) -> Option<&RecordBatch> {
        self.tables.as_ref().map(|t| &t.normal)
    }

    /// The full per-sample table. `None` unless time series.
    pub fn full_table(&self) -> Option<&RecordBatch> {
        self.tables.as_ref().and_then(|t| t.full.as_ref())
    }

    /// The table filters operate against: full when time series, else normal.
    pub fn backing_table(&self) -> Option<&RecordBatch> {
        let tables = self.tables.as_ref()?;
        Some(tables.full.as_ref().unwrap_or(&tables.normal))
    }

    /// Global per-variable bounds.
    pub fn variable_ranges(&self) -> &VariableRanges {
        &self.variable_ranges
    }

    /// Bounds scoped to one storm. Time series only.
    pub fn storm_ranges(&self, storm_id: &str) -> Option<&VariableRanges> {
        self.ranges_by_storm.get(storm_id)
    }

    /// All per-storm range maps. Time series only.
    pub fn ranges_by_storm(&self) -> &StormRanges {
        &self.ranges_by_storm
    }

    /// Ordered children of a split parent; empty otherwise.
    pub fn children(&self) -> &[ConvertedDataset] {
        &self.children
    }

    /// Unique storm IDs of a time-series dataset, as decimal text,
    /// ascending. Empty for non-time-series datasets.
    pub fn storm_ids(&self) -> Vec<String> {
        if !self.is_time_series {
            return Vec::new();
        }
        let Some(normal) = self.normal_table() else {
            return Vec::new();
        };
        let Some(ids) = table::int_column(normal, STORM_ID) else {
            return Vec::new();
        };
        let mut unique: Vec<i64> = ids.values().to_vec();
        unique.sort_unstable();
        unique.dedup();
        unique.into_iter().map(|id| id.to_string()).collect()
    }
}
