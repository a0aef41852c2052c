//! V2 SACSNCSEFL peak-response files.
//!
//! One row per storm. The save-point identity lives in scalar file
//! attributes and is broadcast across all storms; storm identity comes
//! from top-level datasets; every remaining dataset is a float response
//! column. When both raw time datasets carry at least one real sample,
//! three derived columns are synthesized from the `Units` epoch
//! declaration: an absolute landfall time, the peak offset duration, and
//! the reserved timestamp column `landfall - peak`. If either raw column
//! is wholly missing, no derived column is produced at all.

use chrono::NaiveDateTime;
use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges;
use crate::source::SourceFile;
use crate::table::{Columns, STORM_ID, TIME_COLUMN};

use super::{
    ensure_len, push_attr_broadcast, require_attr, ArrowSnafu, BadUnitsSnafu, BuildOptions,
    MissingAttributeSnafu, MissingDatasetSnafu, SchemaError, SourceSnafu, SAVE_POINT_DEPTH,
    SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON, STORM_NAME, STORM_TYPE,
};

/// Raw dataset of landfall times, in hours since the declared epoch.
const LANDFALL_TIME: &str = "Landfall Time";
/// Raw dataset of peak offsets, in hours.
const PEAK_TIME: &str = "Peak Time";
/// Dataset-level attribute declaring the time epoch.
const UNITS_ATTR: &str = "Units";

/// Millisecond count of one hour.
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Parse an epoch declaration like `hrs since 1970-01-01 00:00:00Z`
/// into epoch milliseconds.
fn parse_units_epoch(value: &str) -> Result<i64, SchemaError> {
    let (_, stamp) = value
        .split_once(" since ")
        .context(BadUnitsSnafu { value })?;
    let stamp = stamp.trim_end_matches('Z').trim();
    let parsed = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S")
        .ok()
        .context(BadUnitsSnafu { value })?;
    Ok(parsed.and_utc().timestamp_millis())
}

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let storm_ids = file
        .dataset(STORM_ID)
        .context(MissingDatasetSnafu { name: STORM_ID })?
        .to_ints(STORM_ID)
        .context(SourceSnafu)?;
    let n = storm_ids.len();

    let file_cols = [SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON, SAVE_POINT_DEPTH];
    let range_steps = usize::from(opts.build_ranges);
    sink.begin(3 + range_steps + opts.trailing_steps);

    let mut columns = Columns::new();
    for name in file_cols {
        let attr = require_attr(&file.attrs, name)?;
        push_attr_broadcast(&mut columns, name, attr, n)?;
    }
    columns.push_int(STORM_ID, storm_ids);

    let names = file
        .dataset(STORM_NAME)
        .context(MissingDatasetSnafu { name: STORM_NAME })?
        .to_texts(STORM_NAME)
        .context(SourceSnafu)?;
    ensure_len(STORM_NAME, n, names.len())?;
    columns.push_text(STORM_NAME, names);

    // Storm Type is absent from some studies; skip silently.
    if let Some(types) = file.dataset(STORM_TYPE) {
        let types = types.to_texts(STORM_TYPE).context(SourceSnafu)?;
        ensure_len(STORM_TYPE, n, types.len())?;
        columns.push_text(STORM_TYPE, types);
    }
    sink.step(1);

    let reserved = [
        STORM_ID,
        STORM_NAME,
        STORM_TYPE,
        LANDFALL_TIME,
        PEAK_TIME,
    ];
    let vars_other: Vec<&str> = file
        .dataset_names()
        .filter(|n| !reserved.contains(n) && !file_cols.contains(n))
        .collect();
    for &name in &vars_other {
        let dataset = file
            .dataset(name)
            .context(MissingDatasetSnafu { name })?;
        let values = dataset.to_floats(name).context(SourceSnafu)?;
        ensure_len(name, n, values.len())?;
        columns.push_float(name, values);
    }
    sink.step(2);

    let landfall_ds = file
        .dataset(LANDFALL_TIME)
        .context(MissingDatasetSnafu { name: LANDFALL_TIME })?;
    let landfall_hours = landfall_ds.to_floats(LANDFALL_TIME).context(SourceSnafu)?;
    let peak_hours = file
        .dataset(PEAK_TIME)
        .context(MissingDatasetSnafu { name: PEAK_TIME })?
        .to_floats(PEAK_TIME)
        .context(SourceSnafu)?;
    ensure_len(LANDFALL_TIME, n, landfall_hours.len())?;
    ensure_len(PEAK_TIME, n, peak_hours.len())?;

    let no_landfall = landfall_hours.iter().all(|v| v.is_nan());
    let no_peak = peak_hours.iter().all(|v| v.is_nan());
    let has_derived = !(no_landfall || no_peak);
    if has_derived {
        let units = require_attr(&landfall_ds.attrs, UNITS_ATTR)
            .ok()
            .and_then(|a| a.as_text().map(str::to_string))
            .context(MissingAttributeSnafu { name: UNITS_ATTR })?;
        let epoch_ms = parse_units_epoch(&units)?;

        let landfall: Vec<Option<i64>> = landfall_hours
            .iter()
            .map(|&h| h.is_finite().then(|| epoch_ms + (h * MILLIS_PER_HOUR) as i64))
            .collect();
        let peak: Vec<Option<i64>> = peak_hours
            .iter()
            .map(|&h| h.is_finite().then(|| (h * MILLIS_PER_HOUR) as i64))
            .collect();
        // Per-row partial missingness nulls just that row.
        let derived: Vec<Option<i64>> = landfall
            .iter()
            .zip(&peak)
            .map(|(l, p)| Some(l.as_ref()? - p.as_ref()?))
            .collect();

        columns.push_time(LANDFALL_TIME, landfall);
        columns.push_duration(PEAK_TIME, peak);
        columns.push_time(TIME_COLUMN, derived);
    }
    sink.step(3);

    let normal = columns.finish().context(ArrowSnafu)?;

    let variable_ranges = if opts.build_ranges {
        let mut candidates = vars_other.clone();
        if has_derived {
            candidates.push(TIME_COLUMN);
        }
        let ranges = ranges::index_columns(&normal, candidates.iter().copied());
        sink.step(4);
        ranges
    } else {
        Default::default()
    };

    Ok(ConvertedDataset::from_normal(
        &identity.stem,
        &identity.type_tag,
        normal,
        variable_ranges,
    )
    .with_plottable(identity.is_plottable()))
}
