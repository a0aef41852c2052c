//! V2 AEF products: split into one child dataset per group.
//!
//! Each top-level group (one per frequency product, for example best
//! estimate and confidence limits) becomes its own child named
//! `<stem>^<group>`. The four save-point identity attributes of the file
//! are broadcast into every child; each group dataset is one float
//! column. Ranges are indexed per child over its data columns.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges;
use crate::source::SourceFile;
use crate::table::Columns;

use super::{
    ensure_len, push_attr_broadcast, require_attr, ArrowSnafu, BuildOptions, EmptyGroupSnafu,
    SchemaError, SourceSnafu, UnsupportedLayoutSnafu, SAVE_POINT_DEPTH, SAVE_POINT_ID,
    SAVE_POINT_LAT, SAVE_POINT_LON,
};

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let groups: Vec<_> = file.groups().collect();
    if groups.is_empty() {
        return UnsupportedLayoutSnafu {
            version: file.format_version(),
            type_tag: identity.type_tag.clone(),
            detail: "V2 AEF files hold one group per frequency product",
        }
        .fail();
    }

    let file_cols = [
        SAVE_POINT_ID,
        SAVE_POINT_LAT,
        SAVE_POINT_LON,
        SAVE_POINT_DEPTH,
    ];
    // Resolve the identity attributes once; every child shares them.
    for name in file_cols {
        require_attr(&file.attrs, name)?;
    }

    sink.begin(groups.len() + 1 + opts.trailing_steps);

    let mut children = Vec::with_capacity(groups.len());
    for (i, (gname, group)) in groups.iter().enumerate() {
        ensure!(
            !group.datasets().is_empty(),
            EmptyGroupSnafu { name: *gname }
        );
        let n = group.row_count();

        let mut columns = Columns::new();
        for name in file_cols {
            push_attr_broadcast(&mut columns, name, require_attr(&file.attrs, name)?, n)?;
        }
        let mut data_cols = Vec::with_capacity(group.datasets().len());
        for (name, dataset) in group.datasets() {
            let values = dataset.to_floats(name).context(SourceSnafu)?;
            ensure_len(name, n, values.len())?;
            columns.push_float(name.clone(), values);
            data_cols.push(name.as_str());
        }
        let normal = columns.finish().context(ArrowSnafu)?;

        let variable_ranges = if opts.build_ranges {
            ranges::index_columns(&normal, data_cols)
        } else {
            Default::default()
        };

        children.push(ConvertedDataset::from_normal(
            format!("{}^{gname}", identity.stem),
            &identity.type_tag,
            normal,
            variable_ranges,
        ));
        sink.step(i + 1);
    }
    sink.step(groups.len() + 1);

    Ok(ConvertedDataset::split(
        &identity.stem,
        &identity.type_tag,
        children,
    ))
}
