//! V1 `NLR` (nonlinear response) files: a single flat table.
//!
//! Every top-level dataset is one column. The three save-point identity
//! datasets keep their conventional types; everything else is a float
//! response column. NLR output exists for export, so no range index is
//! built and the dataset is never plottable.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::source::SourceFile;
use crate::table::Columns;

use super::{
    ensure_len, ArrowSnafu, BuildOptions, ColumnKind, MissingDatasetSnafu, SchemaError,
    SourceSnafu, SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON,
};

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    sink.begin(2 + opts.trailing_steps);

    let id_cols = [SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON];
    let first = file
        .dataset(SAVE_POINT_ID)
        .context(MissingDatasetSnafu {
            name: SAVE_POINT_ID,
        })?;
    let n = first.array.len();

    let mut columns = Columns::new();
    for name in id_cols {
        let dataset = file
            .dataset(name)
            .context(MissingDatasetSnafu { name })?;
        match super::column_kind(name) {
            ColumnKind::Int => {
                let values = dataset.to_ints(name).context(SourceSnafu)?;
                ensure_len(name, n, values.len())?;
                columns.push_int(name, values);
            }
            _ => {
                let values = dataset.to_floats(name).context(SourceSnafu)?;
                ensure_len(name, n, values.len())?;
                columns.push_float(name, values);
            }
        }
    }

    let response_cols: Vec<&str> = file
        .dataset_names()
        .filter(|n| !id_cols.contains(n))
        .collect();
    for &name in &response_cols {
        let values = file
            .dataset(name)
            .context(MissingDatasetSnafu { name })?
            .to_floats(name)
            .context(SourceSnafu)?;
        ensure_len(name, n, values.len())?;
        columns.push_float(name, values);
    }
    sink.step(1);

    let normal = columns.finish().context(ArrowSnafu)?;
    sink.step(2);

    Ok(ConvertedDataset::from_normal(
        &identity.stem,
        &identity.type_tag,
        normal,
        Default::default(),
    ))
}
