//! Schema-case dispatch over the CHS layout variants.
//!
//! The dispatcher is a total function over `(format version, type tag,
//! structural shape)`: it selects exactly one of the eight build
//! routines, each of which is a pure transformation from a
//! [`SourceFile`] snapshot to a [`ConvertedDataset`]. A recognized
//! combination whose structural branch is not implemented reports
//! [`SchemaError::UnsupportedLayout`] instead of falling through to an
//! empty result; an *unrecognized version string* falls back to the V1
//! branching, which is how legacy files without the version attribute
//! are handled.
//!
//! Case inventory:
//!
//! | version | type tag            | case                     |
//! |---------|---------------------|--------------------------|
//! | V3      | contains `AEF`      | [`aef_v3`]               |
//! | V2      | `Peaks` (SACSNCSEFL)| [`peaks_v2`]             |
//! | V2      | contains `AEF`      | [`aef_v2`] (split)       |
//! | V1/other| `Locations`         | [`locations`] (split)    |
//! | V1/other| `Timeseries`        | [`timeseries`]           |
//! | V1/other| `NLR`               | [`nlr`]                  |
//! | V1/other| `SRR`               | [`srr`]                  |
//! | V1/other| anything else       | [`universal`]            |

use arrow::error::ArrowError;
use log::debug;
use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::source::{AttrMap, AttrValue, SourceError, SourceFile};
use crate::table::Columns;

pub mod aef_v2;
pub mod aef_v3;
pub mod locations;
pub mod nlr;
pub mod peaks_v2;
pub mod srr;
pub mod timeseries;
pub mod universal;

/// File-attribute column: save point identifier.
pub const SAVE_POINT_ID: &str = "Save Point ID";
/// File-attribute column: save point latitude.
pub const SAVE_POINT_LAT: &str = "Save Point Latitude";
/// File-attribute column: save point longitude.
pub const SAVE_POINT_LON: &str = "Save Point Longitude";
/// Attribute column: save point depth.
pub const SAVE_POINT_DEPTH: &str = "Save Point Depth";
/// Group-attribute column: storm name.
pub const STORM_NAME: &str = "Storm Name";
/// Group-attribute column: storm type.
pub const STORM_TYPE: &str = "Storm Type";

/// Errors raised while building a dataset from a source snapshot.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// A recognized version/tag combination with no implemented
    /// structural branch.
    #[snafu(display(
        "Unsupported layout for version {version}, type tag {type_tag}: {detail}"
    ))]
    UnsupportedLayout {
        /// Declared format version of the file.
        version: String,
        /// Type tag from the file identity.
        type_tag: String,
        /// What exactly is unsupported about the shape.
        detail: String,
    },

    /// A dataset the matched case requires is absent from the source.
    #[snafu(display("Required dataset {name} is missing from the source"))]
    MissingDataset {
        /// Name of the missing dataset.
        name: String,
    },

    /// An attribute the matched case requires is absent.
    #[snafu(display("Required attribute {name} is missing from the source"))]
    MissingAttribute {
        /// Name of the missing attribute.
        name: String,
    },

    /// An attribute exists but cannot be coerced to its column type.
    #[snafu(display("Attribute {name} cannot be coerced to its column type"))]
    BadAttribute {
        /// Name of the offending attribute.
        name: String,
    },

    /// A column came out with the wrong number of rows.
    #[snafu(display("Dataset {name} has {found} rows where {expected} were expected"))]
    LengthMismatch {
        /// Name of the offending dataset.
        name: String,
        /// Expected row count.
        expected: usize,
        /// Actual row count.
        found: usize,
    },

    /// A group contributing to a split or grouped case holds no datasets.
    #[snafu(display("Group {name} holds no datasets"))]
    EmptyGroup {
        /// Name of the empty group.
        name: String,
    },

    /// The epoch declaration on a time dataset could not be parsed.
    #[snafu(display("Cannot parse time units declaration {value:?}"))]
    BadUnits {
        /// The raw units string.
        value: String,
    },

    /// A source array had the wrong type or rank for its role.
    #[snafu(display("Source array error: {source}"))]
    Source {
        /// Underlying source interpretation error.
        source: SourceError,
    },

    /// Arrow rejected the assembled columns.
    #[snafu(display("Arrow error while assembling table: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Behavior switches for the build routines.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Compute range indexes (interactive mode). Pure export runs skip
    /// this cost entirely, including per-storm maps.
    pub build_ranges: bool,
    /// Extra steps the caller will perform after the build (for example
    /// export-on-finish); added to the announced progress total.
    pub trailing_steps: usize,
}

/// Select and run exactly one schema case.
pub fn dispatch(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let version = file.format_version().to_string();
    debug!(
        "dispatching {} (version {}, tag {})",
        identity.stem, version, identity.type_tag
    );
    match version.as_str() {
        "V3" => {
            if identity.is_aef() {
                aef_v3::build(file, identity, opts, sink)
            } else {
                UnsupportedLayoutSnafu {
                    version,
                    type_tag: identity.type_tag.clone(),
                    detail: "V3 files are only implemented for AEF products",
                }
                .fail()
            }
        }
        "V2" => {
            if identity.type_tag == "Peaks" && identity.source_id == "SACSNCSEFL" {
                peaks_v2::build(file, identity, opts, sink)
            } else if identity.is_aef() {
                aef_v2::build(file, identity, opts, sink)
            } else {
                UnsupportedLayoutSnafu {
                    version,
                    type_tag: identity.type_tag.clone(),
                    detail: "V2 files are only implemented for SACSNCSEFL Peaks and AEF products",
                }
                .fail()
            }
        }
        // V1 and any unknown version string.
        _ => match identity.type_tag.as_str() {
            "Locations" => locations::build(file, identity, opts, sink),
            "Timeseries" => timeseries::build(file, identity, opts, sink),
            "NLR" => nlr::build(file, identity, opts, sink),
            "SRR" => srr::build(file, identity, opts, sink),
            _ => universal::build(file, identity, opts, sink),
        },
    }
}

/// Column type of a known identifier/attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    /// Integer ID column.
    Int,
    /// Float measurement column.
    Float,
    /// Text column.
    Text,
}

/// Fixed column types for the named identifier columns; everything else
/// is a float measurement.
pub(crate) fn column_kind(name: &str) -> ColumnKind {
    match name {
        SAVE_POINT_ID | crate::table::STORM_ID => ColumnKind::Int,
        STORM_NAME | STORM_TYPE => ColumnKind::Text,
        _ => ColumnKind::Float,
    }
}

/// Fetch a required attribute.
pub(crate) fn require_attr<'a>(
    attrs: &'a AttrMap,
    name: &str,
) -> Result<&'a AttrValue, SchemaError> {
    attrs.get(name).context(MissingAttributeSnafu { name })
}

/// Broadcast one scalar attribute into a typed column of `n` rows.
pub(crate) fn push_attr_broadcast(
    cols: &mut Columns,
    name: &str,
    attr: &AttrValue,
    n: usize,
) -> Result<(), SchemaError> {
    match column_kind(name) {
        ColumnKind::Int => {
            let v = attr.as_i64().context(BadAttributeSnafu { name })?;
            cols.push_int(name, vec![v; n]);
        }
        ColumnKind::Float => {
            let v = attr.as_f64().context(BadAttributeSnafu { name })?;
            cols.push_float(name, vec![v; n]);
        }
        ColumnKind::Text => {
            let v = attr.as_text().context(BadAttributeSnafu { name })?;
            cols.push_text(name, vec![v.to_string(); n]);
        }
    }
    Ok(())
}

/// Check that a column's length matches the case's row count.
pub(crate) fn ensure_len(name: &str, expected: usize, found: usize) -> Result<(), SchemaError> {
    ensure!(
        found == expected,
        LengthMismatchSnafu {
            name,
            expected,
            found,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use crate::source::{AttrMap, SourceFile, FORMAT_ATTR};

    fn versioned_file(version: &str) -> SourceFile {
        let mut attrs = AttrMap::new();
        attrs.insert(
            FORMAT_ATTR.to_string(),
            AttrValue::Text(version.to_string()),
        );
        SourceFile::new(attrs)
    }

    #[test]
    fn v3_without_aef_is_unsupported() {
        let file = versioned_file("V3");
        let identity = FileIdentity::parse("CHS-LA_a_b_c_d_e_Timeseries").unwrap();
        let err = dispatch(&file, &identity, &BuildOptions::default(), &mut NullSink).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedLayout { .. }));
    }

    #[test]
    fn v2_with_unhandled_tag_is_unsupported() {
        let file = versioned_file("V2");
        let identity = FileIdentity::parse("NACCS_a_b_c_d_e_SRR").unwrap();
        let err = dispatch(&file, &identity, &BuildOptions::default(), &mut NullSink).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedLayout { .. }));
    }

    #[test]
    fn unknown_version_falls_back_to_v1_branching() {
        // A flat file under an unknown version reaches the Universal
        // case, whose group-less layout is the unsupported branch.
        let file = versioned_file("V9");
        let identity = FileIdentity::parse("NACCS_a_b_c_d_e_AEP").unwrap();
        let err = dispatch(&file, &identity, &BuildOptions::default(), &mut NullSink).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedLayout { .. }));
    }

    #[test]
    fn column_kind_table_matches_conventions() {
        assert_eq!(column_kind(SAVE_POINT_ID), ColumnKind::Int);
        assert_eq!(column_kind(crate::table::STORM_ID), ColumnKind::Int);
        assert_eq!(column_kind(SAVE_POINT_LAT), ColumnKind::Float);
        assert_eq!(column_kind(STORM_NAME), ColumnKind::Text);
        assert_eq!(column_kind("Still Water Level"), ColumnKind::Float);
    }
}
