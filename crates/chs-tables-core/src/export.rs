//! CSV export of converted datasets.
//!
//! One UTF-8, comma-delimited file per dataset, header row included, no
//! index column, named `<dataset>.csv` in a caller-supplied directory.
//! Split parents export each child instead of themselves.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::csv::WriterBuilder;
use arrow::error::ArrowError;
use log::debug;
use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::filter::FilterEngine;

/// Errors raised while writing CSV output.
#[derive(Debug, Snafu)]
pub enum ExportError {
    /// The output file could not be created.
    #[snafu(display("Cannot create {path:?}: {source}"))]
    Create {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Arrow failed to serialize the rows.
    #[snafu(display("Cannot write {path:?}: {source}"))]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

fn write_csv(batch: &RecordBatch, path: &Path) -> Result<(), ExportError> {
    debug!("exporting {} rows to {}", batch.num_rows(), path.display());
    let file = File::create(path).context(CreateSnafu { path })?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch).context(WriteSnafu { path })
}

/// Export the complete, unfiltered data of a dataset.
///
/// Time series write their full table, everything else the normal table.
/// A split parent writes one file per child and nothing for itself.
/// Returns the paths written, in order.
pub fn export_full(dataset: &ConvertedDataset, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::new();
    if dataset.is_split {
        for child in dataset.children() {
            written.extend(export_full(child, dir)?);
        }
        return Ok(written);
    }
    if let Some(batch) = dataset.backing_table() {
        let path = dir.join(format!("{}.csv", dataset.name));
        write_csv(batch, &path)?;
        written.push(path);
    }
    Ok(written)
}

/// Export the engine's current (possibly filtered) view.
///
/// When a storm filter is active the filename carries a `^<storm>`
/// suffix so the export never clobbers the unfiltered file.
pub fn export_current(engine: &FilterEngine<'_>, dir: &Path) -> Result<PathBuf, ExportError> {
    let name = match engine.active_storm() {
        Some(id) => format!("{}^{id}.csv", engine.dataset().name),
        None => format!("{}.csv", engine.dataset().name),
    };
    let path = dir.join(name);
    write_csv(engine.current(), &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::VariableRanges;
    use crate::table::{Columns, STORM_ID};

    fn plain_dataset(name: &str) -> ConvertedDataset {
        let mut cols = Columns::new();
        cols.push_int(STORM_ID, vec![1, 2]);
        cols.push_float("Surge", vec![1.5, 2.5]);
        ConvertedDataset::from_normal(
            name,
            "Peaks",
            cols.finish().unwrap(),
            VariableRanges::new(),
        )
    }

    #[test]
    fn export_full_writes_one_csv() {
        let dir = tempfile::tempdir().unwrap();
        let ds = plain_dataset("example");
        let written = export_full(&ds, dir.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("example.csv"));

        let text = std::fs::read_to_string(&written[0]).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Storm ID,Surge"));
        assert_eq!(lines.next(), Some("1,1.5"));
        assert_eq!(lines.next(), Some("2,2.5"));
    }

    #[test]
    fn split_parent_exports_each_child() {
        let dir = tempfile::tempdir().unwrap();
        let parent = ConvertedDataset::split(
            "parent",
            "Locations",
            vec![plain_dataset("parent^Nodes"), plain_dataset("parent^Elements")],
        );
        let written = export_full(&parent, dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("parent^Nodes.csv").exists());
        assert!(dir.path().join("parent^Elements.csv").exists());
        assert!(!dir.path().join("parent.csv").exists());
    }

    #[test]
    fn current_export_suffixes_active_storm() {
        let dir = tempfile::tempdir().unwrap();

        let mut cols = Columns::new();
        cols.push_int(STORM_ID, vec![7, 7, 9]);
        cols.push_float("Surge", vec![1.0, 2.0, 3.0]);
        let full = cols.finish().unwrap();
        let mut cols = Columns::new();
        cols.push_int(STORM_ID, vec![7, 9]);
        let normal = cols.finish().unwrap();
        let ds = ConvertedDataset::time_series(
            "ts",
            "Timeseries",
            normal,
            full,
            VariableRanges::new(),
            Default::default(),
        );

        let mut engine = FilterEngine::new(&ds).unwrap();
        engine.apply_storm_filter(7).unwrap();
        let path = export_current(&engine, dir.path()).unwrap();
        assert!(path.ends_with("ts^7.csv"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3); // header + two rows
    }

    #[test]
    fn unwritable_directory_errors() {
        let ds = plain_dataset("x");
        let err = export_full(&ds, Path::new("/nonexistent-dir-for-sure")).unwrap_err();
        assert!(matches!(err, ExportError::Create { .. }));
    }
}
