//! In-memory model of one hierarchical CHS source container.
//!
//! A CHS file is a two-level hierarchy: file-level attributes plus named
//! top-level entries that are either flat arrays ("datasets") or
//! sub-containers ("groups") carrying their own attributes and datasets.
//! The schema cases never touch the on-disk reader directly; they consume
//! an owned [`SourceFile`] snapshot, which keeps every build routine pure
//! and lets tests construct containers without any HDF5 tooling.
//!
//! The snapshot preserves entry order as stored in the file, because
//! several schema cases derive column order from it (for example, the
//! AEF-v3 pass-through columns are "every top-level dataset after the two
//! seed arrays").
//!
//! Loading a snapshot from disk lives in [`hdf5`](crate::source::hdf5)
//! (cargo feature `hdf5`); archive-member inputs are handled by
//! [`archive`](crate::source::archive).

use std::collections::BTreeMap;

use snafu::prelude::*;

pub mod archive;
#[cfg(feature = "hdf5")]
pub mod hdf5;

/// Name of the file-level attribute declaring the CHS format version.
pub const FORMAT_ATTR: &str = "CHS File Format";

/// Version assumed when the format attribute is absent or unreadable.
pub const DEFAULT_VERSION: &str = "V1";

/// A scalar attribute value attached to a file, group, or dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text scalar (already decoded to UTF-8).
    Text(String),
}

impl AttrValue {
    /// View the attribute as an integer, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// View the attribute as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Text(_) => None,
        }
    }

    /// View the attribute as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Named scalar attributes, keyed by attribute name.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Errors raised while interpreting source arrays.
#[derive(Debug, Snafu)]
pub enum SourceError {
    /// A dataset held text where a numeric array was required.
    #[snafu(display("Dataset {name} holds text values where numbers were expected"))]
    NotNumeric {
        /// Name of the offending dataset.
        name: String,
    },

    /// A dataset held numbers where text was required.
    #[snafu(display("Dataset {name} holds numeric values where text was expected"))]
    NotText {
        /// Name of the offending dataset.
        name: String,
    },

    /// A 2-D dataset was required but a flat array was found (or vice versa).
    #[snafu(display("Dataset {name} has the wrong rank: expected {expected}"))]
    WrongRank {
        /// Name of the offending dataset.
        name: String,
        /// Human-readable description of the expected shape.
        expected: &'static str,
    },
}

/// Raw values of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    /// 1-D float array. NaN marks a missing value.
    Floats(Vec<f64>),
    /// 1-D integer array.
    Ints(Vec<i64>),
    /// 1-D text array.
    Texts(Vec<String>),
    /// 2-D float array, row-major.
    Matrix {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
        /// Row-major cell values; `values.len() == rows * cols`.
        values: Vec<f64>,
    },
}

impl DataArray {
    /// Number of logical elements: array length, or row count for a matrix.
    pub fn len(&self) -> usize {
        match self {
            DataArray::Floats(v) => v.len(),
            DataArray::Ints(v) => v.len(),
            DataArray::Texts(v) => v.len(),
            DataArray::Matrix { rows, .. } => *rows,
        }
    }

    /// True when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One dataset: its raw values plus any dataset-level attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Raw array values.
    pub array: DataArray,
    /// Dataset-level attributes (for example, the `Units` epoch string).
    pub attrs: AttrMap,
}

impl Dataset {
    /// Wrap a bare array with no attributes.
    pub fn new(array: DataArray) -> Self {
        Dataset {
            array,
            attrs: AttrMap::new(),
        }
    }

    /// Wrap an array together with its attributes.
    pub fn with_attrs(array: DataArray, attrs: AttrMap) -> Self {
        Dataset { array, attrs }
    }

    /// Read the values as floats, widening integers. Text data errors.
    pub fn to_floats(&self, name: &str) -> Result<Vec<f64>, SourceError> {
        match &self.array {
            DataArray::Floats(v) => Ok(v.clone()),
            DataArray::Ints(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            DataArray::Matrix { values, .. } => Ok(values.clone()),
            DataArray::Texts(_) => NotNumericSnafu { name }.fail(),
        }
    }

    /// Read the values as integers, truncating floats. Text data errors.
    pub fn to_ints(&self, name: &str) -> Result<Vec<i64>, SourceError> {
        match &self.array {
            DataArray::Ints(v) => Ok(v.clone()),
            DataArray::Floats(v) => Ok(v.iter().map(|&x| x as i64).collect()),
            DataArray::Texts(_) | DataArray::Matrix { .. } => NotNumericSnafu { name }.fail(),
        }
    }

    /// Read the values as text.
    pub fn to_texts(&self, name: &str) -> Result<Vec<String>, SourceError> {
        match &self.array {
            DataArray::Texts(v) => Ok(v.clone()),
            _ => NotTextSnafu { name }.fail(),
        }
    }

    /// Read a 2-D dataset, returning `(rows, cols, row-major values)`.
    pub fn to_matrix(&self, name: &str) -> Result<(usize, usize, &[f64]), SourceError> {
        match &self.array {
            DataArray::Matrix { rows, cols, values } => Ok((*rows, *cols, values)),
            _ => WrongRankSnafu {
                name,
                expected: "a 2-D array",
            }
            .fail(),
        }
    }
}

/// A sub-container: its attributes plus ordered named datasets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceGroup {
    /// Group-level attributes.
    pub attrs: AttrMap,
    datasets: Vec<(String, Dataset)>,
}

impl SourceGroup {
    /// Create an empty group with the given attributes.
    pub fn new(attrs: AttrMap) -> Self {
        SourceGroup {
            attrs,
            datasets: Vec::new(),
        }
    }

    /// Append a dataset, preserving insertion order.
    pub fn push_dataset(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.datasets.push((name.into(), dataset));
    }

    /// Ordered `(name, dataset)` pairs.
    pub fn datasets(&self) -> &[(String, Dataset)] {
        &self.datasets
    }

    /// Look up a dataset by name.
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    /// Row count of the first dataset, the group's logical sample count.
    pub fn row_count(&self) -> usize {
        self.datasets.first().map(|(_, d)| d.array.len()).unwrap_or(0)
    }
}

/// A top-level entry: either a flat dataset or a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A flat array at the top level.
    Dataset(Dataset),
    /// A sub-container at the top level.
    Group(SourceGroup),
}

/// An owned snapshot of one CHS source container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFile {
    /// File-level attributes.
    pub attrs: AttrMap,
    entries: Vec<(String, Entry)>,
}

impl SourceFile {
    /// Create an empty container with the given file attributes.
    pub fn new(attrs: AttrMap) -> Self {
        SourceFile {
            attrs,
            entries: Vec::new(),
        }
    }

    /// Append a top-level dataset, preserving insertion order.
    pub fn push_dataset(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.entries.push((name.into(), Entry::Dataset(dataset)));
    }

    /// Append a top-level group, preserving insertion order.
    pub fn push_group(&mut self, name: impl Into<String>, group: SourceGroup) {
        self.entries.push((name.into(), Entry::Group(group)));
    }

    /// Declared format version, defaulting to [`DEFAULT_VERSION`] when the
    /// attribute is absent or not text.
    pub fn format_version(&self) -> &str {
        self.attrs
            .get(FORMAT_ATTR)
            .and_then(AttrValue::as_text)
            .unwrap_or(DEFAULT_VERSION)
    }

    /// Ordered `(name, entry)` pairs.
    pub fn entries(&self) -> &[(String, Entry)] {
        &self.entries
    }

    /// Look up a top-level dataset by name.
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.entries.iter().find_map(|(n, e)| match e {
            Entry::Dataset(d) if n == name => Some(d),
            _ => None,
        })
    }

    /// Ordered top-level groups.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &SourceGroup)> {
        self.entries.iter().filter_map(|(n, e)| match e {
            Entry::Group(g) => Some((n.as_str(), g)),
            Entry::Dataset(_) => None,
        })
    }

    /// Ordered top-level dataset names.
    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(n, e)| match e {
            Entry::Dataset(_) => Some(n.as_str()),
            Entry::Group(_) => None,
        })
    }

    /// True when the first top-level entry is a group.
    ///
    /// CHS files are homogeneous at the top level, so the first entry
    /// decides the structural shape for the whole file.
    pub fn has_groups(&self) -> bool {
        matches!(self.entries.first(), Some((_, Entry::Group(_))))
    }

    /// The first top-level entry, if any.
    pub fn first_entry(&self) -> Option<&Entry> {
        self.entries.first().map(|(_, e)| e)
    }

    /// Row count of the first top-level dataset.
    pub fn first_dataset_len(&self) -> usize {
        self.entries
            .iter()
            .find_map(|(_, e)| match e {
                Entry::Dataset(d) => Some(d.array.len()),
                Entry::Group(_) => None,
            })
            .unwrap_or(0)
    }
}
