//! V1 `Timeseries` files: one group per storm, two output tables.
//!
//! Each top-level group holds the per-sample datasets of one storm plus
//! the storm's attributes. The build produces:
//!
//! - a *normal* table with one summary row per storm, where each data
//!   column carries its shape as text (`"{n} x 1"`), and
//! - a *full* table with one row per raw sample, attrs broadcast across
//!   the storm's samples and the raw time column decoded to timestamps.
//!
//! Within each storm the full rows are ordered by time (invalid samples
//! last); storms are then concatenated in ascending storm-ID order.
//! Range indexes are kept twice: globally over the full table and
//! per storm, keyed by the storm ID's decimal text.

use snafu::prelude::*;

use crate::dataset::{ConvertedDataset, StormRanges};
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges::{self, RangeBound, VariableRanges};
use crate::source::SourceFile;
use crate::table::{self, Columns, STORM_ID, TIME_COLUMN};

use super::{
    ensure_len, push_attr_broadcast, require_attr, ArrowSnafu, BadAttributeSnafu, BuildOptions,
    EmptyGroupSnafu, MissingDatasetSnafu, SchemaError, SourceSnafu, UnsupportedLayoutSnafu,
    SAVE_POINT_DEPTH, SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON, STORM_NAME, STORM_TYPE,
};

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
            detail: "time-series files hold one group per storm",
        }
        .fail();
    };

    // Column inventory is fixed by the first storm; every storm must
    // carry the same datasets.
    let data_cols: Vec<String> = first.datasets().iter().map(|(n, _)| n.clone()).collect();
    ensure!(
        data_cols.iter().any(|n| n == TIME_COLUMN),
        MissingDatasetSnafu { name: TIME_COLUMN }
    );
    let data_but_time: Vec<&str> = data_cols
        .iter()
        .map(String::as_str)
        .filter(|&n| n != TIME_COLUMN)
        .collect();

    // Identity attributes are optional except the storm key; absent ones
    // simply produce no column.
    let file_cols: Vec<&str> = [SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON]
        .into_iter()
        .filter(|&n| file.attrs.contains_key(n))
        .collect();
    let grup_cols: Vec<&str> = [SAVE_POINT_DEPTH, STORM_ID, STORM_NAME, STORM_TYPE]
        .into_iter()
        .filter(|&n| first.attrs.contains_key(n))
        .collect();

    sink.begin(groups.len() + 1 + opts.trailing_steps);

    let mut normal_parts = Vec::with_capacity(groups.len());
    let mut full_parts = Vec::with_capacity(groups.len());
    let mut ranges_by_storm = StormRanges::new();

    for (i, (gname, group)) in groups.iter().enumerate() {
        ensure!(
            !group.datasets().is_empty(),
            EmptyGroupSnafu { name: *gname }
        );
        let n = group.row_count();
        let storm_id = require_attr(&group.attrs, STORM_ID)?
            .as_i64()
            .context(BadAttributeSnafu { name: STORM_ID })?;

        // Summary row: identity attrs plus the shape of each data column.
        let mut cols = Columns::new();
        for &name in &file_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&file.attrs, name)?, 1)?;
        }
        for &name in &grup_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&group.attrs, name)?, 1)?;
        }
        for name in &data_cols {
            cols.push_text(name.clone(), vec![format!("{n} x 1")]);
        }
        normal_parts.push(cols.finish().context(ArrowSnafu)?);

        // Per-sample rows.
        let mut cols = Columns::new();
        for &name in &file_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&file.attrs, name)?, n)?;
        }
        for &name in &grup_cols {
            push_attr_broadcast(&mut cols, name, require_attr(&group.attrs, name)?, n)?;
        }
        let mut storm_ranges = VariableRanges::new();
        for &name in &data_but_time {
            let values = group
                .dataset(name)
                .context(MissingDatasetSnafu { name })?
                .to_floats(name)
                .context(SourceSnafu)?;
            ensure_len(name, n, values.len())?;
            if opts.build_ranges {
                if let Some((min, max)) = ranges::numeric_range_of(&values) {
                    storm_ranges.insert(name.to_string(), RangeBound::Numeric { min, max });
                }
            }
            cols.push_float(name, values);
        }
        let raw_time = group
            .dataset(TIME_COLUMN)
            .context(MissingDatasetSnafu { name: TIME_COLUMN })?
            .to_floats(TIME_COLUMN)
            .context(SourceSnafu)?;
        ensure_len(TIME_COLUMN, n, raw_time.len())?;
        cols.push_time(TIME_COLUMN, table::decode_time_array(&raw_time));

        let batch = cols.finish().context(ArrowSnafu)?;
        let batch = table::sort_batch(&batch, &[TIME_COLUMN]).context(ArrowSnafu)?;
        if opts.build_ranges {
            if let Some(array) = table::time_column(&batch, TIME_COLUMN) {
                if let Some((min, max)) = ranges::timestamp_range(array) {
                    storm_ranges.insert(TIME_COLUMN.to_string(), RangeBound::Time { min, max });
                }
            }
            ranges_by_storm.insert(storm_id.to_string(), storm_ranges);
        }
        full_parts.push(batch);
        sink.step(i + 1);
    }

    let normal = table::concat_batches(&normal_parts).context(ArrowSnafu)?;
    let normal = table::sort_batch(&normal, &[STORM_ID]).context(ArrowSnafu)?;
    let full = table::concat_batches(&full_parts).context(ArrowSnafu)?;
    let full = table::sort_batch(&full, &[STORM_ID, TIME_COLUMN]).context(ArrowSnafu)?;

    let variable_ranges = if opts.build_ranges {
        let candidates = data_but_time.iter().copied().chain([TIME_COLUMN]);
        ranges::index_columns(&full, candidates)
    } else {
        Default::default()
    };
    sink.step(groups.len() + 1);

    Ok(ConvertedDataset::time_series(
        &identity.stem,
        &identity.type_tag,
        normal,
        full,
        variable_ranges,
        ranges_by_storm,
    ))
}
