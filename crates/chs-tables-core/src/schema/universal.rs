//! Fallback case for grouped V1 files (`STcond`, `Params`, `Peaks`,
//! `AEP`, and anything without a dedicated layout).
//!
//! Produces a single expanded table: every group contributes one row per
//! sample, with the applicable identity attributes broadcast across the
//! group. Which identity columns apply depends on the type tag: storm
//! condition and parameter files carry no save-point identity, AEP files
//! carry no storm identity. A raw time column, when present, is decoded
//! and ordered within each group; the concatenated result is ordered by
//! storm ID whenever that column exists.
//!
//! Flat (group-less) files have no defined layout here and are rejected.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges;
use crate::source::SourceFile;
use crate::table::{self, Columns, STORM_ID, TIME_COLUMN};

use super::{
    ensure_len, push_attr_broadcast, require_attr, ArrowSnafu, BuildOptions, EmptyGroupSnafu,
    MissingDatasetSnafu, SchemaError, SourceSnafu, UnsupportedLayoutSnafu, SAVE_POINT_DEPTH,
    SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON, STORM_NAME, STORM_TYPE,
};

/// Identity columns applicable to a type tag, filtered to those present.
fn identity_columns<'a>(
    identity: &FileIdentity,
    file: &'a SourceFile,
    first_attrs: &'a crate::source::AttrMap,
) -> (Vec<&'static str>, Vec<&'static str>) {
    let no_save_point = matches!(identity.type_tag.as_str(), "STcond" | "Param" | "Params");
    let file_cols: Vec<&'static str> = if no_save_point {
        Vec::new()
    } else {
        [SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON]
            .into_iter()
            .filter(|&n| file.attrs.contains_key(n))
            .collect()
    };
    let candidates: &[&'static str] = if no_save_point {
        &[STORM_NAME, STORM_TYPE]
    } else if identity.type_tag == "AEP" {
        &[]
    } else {
        &[SAVE_POINT_DEPTH, STORM_ID, STORM_NAME, STORM_TYPE]
    };
    let grup_cols = candidates
        .iter()
        .copied()
        .filter(|&n| first_attrs.contains_key(n))
        .collect();
    (file_cols, grup_cols)
}

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let groups: Vec<_> = file.groups().collect();
    let Some((_, first)) = groups.first() else {
        return UnsupportedLayoutSnafu {
            version: file.format_version(),
            type_tag: identity.type_tag.clone(),
            detail: "flat files have no defined layout for this type tag",
        }
        .fail();
    };

    let (file_cols, grup_cols) = identity_columns(identity, file, &first.attrs);
    let data_cols: Vec<String> = first.datasets().iter().map(|(n, _)| n.clone()).collect();
    let has_time = data_cols.iter().any(|n| n == TIME_COLUMN);
    let data_but_time: Vec<&str> = data_cols
        .iter()
        .map(String::as_str)
        .filter(|&n| n != TIME_COLUMN)
        .collect();

    let range_steps = usize::from(opts.build_ranges);
    sink.begin(groups.len() + range_steps + 1 + opts.trailing_steps);

    let mut parts = Vec::with_capacity(groups.len());
    for (i, (gname, group)) in groups.iter().enumerate() {
        ensure!(
            !group.datasets().is_empty(),
            EmptyGroupSnafu { name: *gname }
        );
        let n = group.row_count();

        let mut cols = Columns::new();
        for &name in &file_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&file.attrs, name)?, n)?;
        }
        for &name in &grup_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&group.attrs, name)?, n)?;
        }
        for &name in &data_but_time {
            let values = group
                .dataset(name)
                .context(MissingDatasetSnafu { name })?
                .to_floats(name)
                .context(SourceSnafu)?;
            ensure_len(name, n, values.len())?;
            cols.push_float(name, values);
        }
        if has_time {
            let raw = group
                .dataset(TIME_COLUMN)
                .context(MissingDatasetSnafu { name: TIME_COLUMN })?
                .to_floats(TIME_COLUMN)
                .context(SourceSnafu)?;
            ensure_len(TIME_COLUMN, n, raw.len())?;
            cols.push_time(TIME_COLUMN, table::decode_time_array(&raw));
        }

        let batch = cols.finish().context(ArrowSnafu)?;
        let batch = if has_time {
            table::sort_batch(&batch, &[TIME_COLUMN]).context(ArrowSnafu)?
        } else {
            batch
        };
        parts.push(batch);
        sink.step(i + 1);
    }

    let normal = table::concat_batches(&parts).context(ArrowSnafu)?;
    // A no-op when the storm key is not among the identity columns.
    let normal = table::sort_batch(&normal, &[STORM_ID]).context(ArrowSnafu)?;

    let variable_ranges = if opts.build_ranges {
        let candidates: Vec<&str> = if has_time {
            data_but_time.iter().copied().chain([TIME_COLUMN]).collect()
        } else {
            data_cols.iter().map(String::as_str).collect()
        };
        let r = ranges::index_columns(&normal, candidates);
        sink.step(groups.len() + 1);
        r
    } else {
        Default::default()
    };
    sink.step(groups.len() + range_steps + 1);

    Ok(ConvertedDataset::from_normal(
        &identity.stem,
        &identity.type_tag,
        normal,
        variable_ranges,
    )
    .with_plottable(identity.is_plottable()))
}
