//! Disk loader: HDF5 container to an owned [`SourceFile`] snapshot.
//!
//! Only this module touches libhdf5, which is why it sits behind the
//! `hdf5` cargo feature: every schema case and test consumes the
//! in-memory snapshot and builds without the system library.
//!
//! Attribute scalars are probed as text, then integer, then float;
//! attributes of any other shape are skipped rather than failing the
//! whole load. Datasets map 1-D numeric arrays to float/int columns,
//! 1-D string arrays to text, and 2-D numeric arrays to row-major
//! matrices.

use std::path::{Path, PathBuf};

use hdf5::types::{TypeDescriptor, VarLenUnicode};
use log::{debug, warn};
use snafu::prelude::*;

use super::{AttrMap, AttrValue, DataArray, Dataset, SourceFile, SourceGroup};

/// Errors raised while reading an HDF5 container.
#[derive(Debug, Snafu)]
pub enum Hdf5Error {
    /// The container could not be opened.
    #[snafu(display("Cannot open {path:?}: {source}"))]
    Open {
        /// Source path.
        path: PathBuf,
        /// Underlying HDF5 error.
        source: hdf5::Error,
    },

    /// An entry inside the container could not be read.
    #[snafu(display("Cannot read {name}: {source}"))]
    Read {
        /// Entry name.
        name: String,
        /// Underlying HDF5 error.
        source: hdf5::Error,
    },

    /// A dataset's element type has no tabular mapping.
    #[snafu(display("Dataset {name} has an unsupported element type"))]
    UnsupportedType {
        /// Dataset name.
        name: String,
    },

    /// A dataset's rank has no tabular mapping.
    #[snafu(display("Dataset {name} has unsupported rank {rank}"))]
    UnsupportedRank {
        /// Dataset name.
        name: String,
        /// Number of dimensions found.
        rank: usize,
    },
}

/// Load a container from disk into an owned snapshot.
pub fn load(path: &Path) -> Result<SourceFile, Hdf5Error> {
    debug!("loading {}", path.display());
    let file = hdf5::File::open(path).context(OpenSnafu { path })?;
    let mut source = SourceFile::new(read_attrs(&file));

    let names = file.member_names().context(ReadSnafu { name: "/" })?;
    for name in names {
        if let Ok(group) = file.group(&name) {
            source.push_group(name.clone(), read_group(&group, &name)?);
        } else {
            let dataset = file.dataset(&name).context(ReadSnafu { name: &name })?;
            source.push_dataset(name.clone(), read_dataset(&dataset, &name)?);
        }
    }
    Ok(source)
}

fn read_group(group: &hdf5::Group, gname: &str) -> Result<SourceGroup, Hdf5Error> {
    let mut out = SourceGroup::new(read_attrs(group));
    let names = group.member_names().context(ReadSnafu { name: gname })?;
    for name in names {
        let qualified = format!("{gname}/{name}");
        let dataset = group
            .dataset(&name)
            .context(ReadSnafu { name: &qualified })?;
        out.push_dataset(name, read_dataset(&dataset, &qualified)?);
    }
    Ok(out)
}

/// Read every scalar attribute of a location, skipping unreadable ones.
fn read_attrs(location: &hdf5::Location) -> AttrMap {
    let mut attrs = AttrMap::new();
    let names = match location.attr_names() {
        Ok(names) => names,
        Err(_) => return attrs,
    };
    for name in names {
        let Ok(attr) = location.attr(&name) else {
            continue;
        };
        let value = if let Ok(text) = attr.read_scalar::<VarLenUnicode>() {
            AttrValue::Text(text.to_string())
        } else if let Ok(int) = attr.read_scalar::<i64>() {
            AttrValue::Int(int)
        } else if let Ok(float) = attr.read_scalar::<f64>() {
            AttrValue::Float(float)
        } else {
            warn!("skipping unreadable attribute {name}");
            continue;
        };
        attrs.insert(name, value);
    }
    attrs
}

fn read_dataset(dataset: &hdf5::Dataset, name: &str) -> Result<Dataset, Hdf5Error> {
    let attrs = read_attrs(dataset);
    let shape = dataset.shape();
    let descriptor = dataset
        .dtype()
        .and_then(|d| d.to_descriptor())
        .context(ReadSnafu { name })?;

    let array = match shape.len() {
        0 | 1 => match descriptor {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => DataArray::Ints(
                dataset.read_raw::<i64>().context(ReadSnafu { name })?,
            ),
            TypeDescriptor::Float(_) => DataArray::Floats(
                dataset.read_raw::<f64>().context(ReadSnafu { name })?,
            ),
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => DataArray::Texts(
                dataset
                    .read_raw::<VarLenUnicode>()
                    .context(ReadSnafu { name })?
                    .into_iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            _ => return UnsupportedTypeSnafu { name }.fail(),
        },
        2 => {
            let values = dataset.read_raw::<f64>().context(ReadSnafu { name })?;
            DataArray::Matrix {
                rows: shape[0],
                cols: shape[1],
                values,
            }
        }
        rank => return UnsupportedRankSnafu { name, rank }.fail(),
    };
    Ok(Dataset::with_attrs(array, attrs))
}
