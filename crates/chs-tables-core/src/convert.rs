//! The conversion entry point.
//!
//! A [`Converter`] turns one source container into one
//! [`ConvertedDataset`]: parse the identity from the file stem, dispatch
//! the schema case, and optionally export the result before returning.
//! Interactive mode controls whether range indexes are computed; a pure
//! export run skips that cost.
//!
//! The disk path (`convert`) resolves `archive;member` inputs through a
//! scoped scratch extraction and is gated on the `hdf5` feature;
//! `convert_source` consumes an in-memory snapshot and is always
//! available.

use std::path::PathBuf;

use log::info;
use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::export::{self, ExportError};
use crate::identity::{FileIdentity, IdentityError};
use crate::progress::ProgressSink;
use crate::schema::{self, BuildOptions, SchemaError};
use crate::source::archive::ArchiveError;
use crate::source::SourceFile;

/// Errors raised by a conversion run.
#[derive(Debug, Snafu)]
pub enum ConvertError {
    /// The file stem does not identify a CHS product.
    #[snafu(display("Ineligible input: {source}"))]
    Identity {
        /// Underlying identity error.
        source: IdentityError,
    },

    /// The matched schema case failed to build.
    #[snafu(display("Conversion failed: {source}"))]
    Schema {
        /// Underlying schema error.
        source: SchemaError,
    },

    /// The finished dataset could not be exported.
    #[snafu(display("Export failed: {source}"))]
    Export {
        /// Underlying export error.
        source: ExportError,
    },

    /// The archive member could not be extracted.
    #[snafu(display("Archive input failed: {source}"))]
    Archive {
        /// Underlying archive error.
        source: ArchiveError,
    },

    /// The source container could not be loaded from disk.
    #[cfg(feature = "hdf5")]
    #[snafu(display("Source load failed: {source}"))]
    Load {
        /// Underlying loader error.
        source: crate::source::hdf5::Hdf5Error,
    },
}

/// Behavior switches for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Write CSV output as the final conversion step.
    pub export_on_finish: bool,
    /// Compute range indexes for interactive filtering.
    pub interactive: bool,
    /// Directory receiving exported CSV files.
    pub results_dir: PathBuf,
}

/// Converts source containers into datasets.
#[derive(Debug, Clone)]
pub struct Converter {
    options: ConvertOptions,
}

/// Forwards progress while tracking the announced total, so the
/// converter can emit the trailing export step itself.
struct CountingSink<'s> {
    inner: &'s mut dyn ProgressSink,
    total: usize,
}

impl ProgressSink for CountingSink<'_> {
    fn begin(&mut self, total: usize) {
        self.total = total;
        self.inner.begin(total);
    }

    fn step(&mut self, completed: usize) {
        self.inner.step(completed);
    }
}

impl Converter {
    /// Create a converter with the given options.
    pub fn new(options: ConvertOptions) -> Self {
        Converter { options }
    }

    /// Convert an in-memory snapshot identified by its file stem.
    pub fn convert_source(
        &self,
        file: &SourceFile,
        stem: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<ConvertedDataset, ConvertError> {
        let identity = FileIdentity::parse(stem).context(IdentitySnafu)?;
        info!(
            "converting {} ({} {})",
            identity.stem,
            file.format_version(),
            identity.type_tag
        );

        let build = BuildOptions {
            build_ranges: self.options.interactive,
            trailing_steps: usize::from(self.options.export_on_finish),
        };
        let mut counting = CountingSink {
            inner: sink,
            total: 0,
        };
        let dataset =
            schema::dispatch(file, &identity, &build, &mut counting).context(SchemaSnafu)?;

        if self.options.export_on_finish {
            export::export_full(&dataset, &self.options.results_dir).context(ExportSnafu)?;
            let total = counting.total;
            counting.step(total);
        }
        Ok(dataset)
    }

    /// Convert a source file on disk, resolving `archive;member` inputs
    /// through a scratch extraction that is removed on every exit path.
    #[cfg(feature = "hdf5")]
    pub fn convert(
        &self,
        input: &crate::source::archive::SourceInput,
        sink: &mut dyn ProgressSink,
    ) -> Result<ConvertedDataset, ConvertError> {
        use crate::source::archive;
        use crate::source::hdf5 as loader;

        let stem = input.stem();
        let file = match &input.member {
            Some(member) => {
                let scratch =
                    archive::extract_member(&input.path, member).context(ArchiveSnafu)?;
                loader::load(scratch.path()).context(LoadSnafu)?
            }
            None => loader::load(&input.path).context(LoadSnafu)?,
        };
        self.convert_source(&file, &stem, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;
    use crate::source::{AttrMap, AttrValue, DataArray, Dataset, SourceGroup};
    use crate::table::{STORM_ID, TIME_COLUMN};

    fn timeseries_source() -> SourceFile {
        let mut attrs = AttrMap::new();
        attrs.insert("Save Point ID".to_string(), AttrValue::Int(5));
        let mut file = SourceFile::new(attrs);
        let mut g_attrs = AttrMap::new();
        g_attrs.insert(STORM_ID.to_string(), AttrValue::Int(44));
        let mut group = SourceGroup::new(g_attrs);
        group.push_dataset(
            "Surge",
            Dataset::new(DataArray::Floats(vec![1.0, 2.0])),
        );
        group.push_dataset(
            TIME_COLUMN,
            Dataset::new(DataArray::Floats(vec![200009101200.0, 200009101300.0])),
        );
        file.push_group("Storm 44", group);
        file
    }

    fn options(dir: &std::path::Path, export: bool) -> ConvertOptions {
        ConvertOptions {
            export_on_finish: export,
            interactive: true,
            results_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn convert_source_exports_and_completes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(options(dir.path(), true));
        let mut sink = RecordingSink::default();
        let ds = converter
            .convert_source(
                &timeseries_source(),
                "NACCS_a_b_c_d_e_Timeseries",
                &mut sink,
            )
            .unwrap();

        assert!(ds.is_time_series);
        assert!(dir
            .path()
            .join("NACCS_a_b_c_d_e_Timeseries.csv")
            .exists());
        // 1 group + assembly + trailing export step.
        assert_eq!(sink.totals, vec![3]);
        assert!(sink.is_complete());
    }

    #[test]
    fn export_off_announces_fewer_steps() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(options(dir.path(), false));
        let mut sink = RecordingSink::default();
        converter
            .convert_source(
                &timeseries_source(),
                "NACCS_a_b_c_d_e_Timeseries",
                &mut sink,
            )
            .unwrap();
        assert_eq!(sink.totals, vec![2]);
        assert!(sink.is_complete());
        assert!(!dir
            .path()
            .join("NACCS_a_b_c_d_e_Timeseries.csv")
            .exists());
    }

    #[test]
    fn bad_stem_is_rejected_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(options(dir.path(), false));
        let err = converter
            .convert_source(
                &timeseries_source(),
                "not-a-chs-stem",
                &mut RecordingSink::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::Identity { .. }));
    }
}
