//! V1 `SRR` (storm response ratio) files.
//!
//! The first top-level entry is a 2-D dataset whose leading three columns
//! are the save-point identity (ID, latitude, longitude), one row per
//! save point. Every remaining top-level entry is a group, and each of
//! its datasets becomes one float column of the output, in file order.
//! Like NLR, the result exists for export: no range index is built.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::source::{Entry, SourceFile};
use crate::table::Columns;

use super::{
    ensure_len, ArrowSnafu, BuildOptions, MissingDatasetSnafu, SchemaError, SourceSnafu,
    UnsupportedLayoutSnafu, SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON,
};

/// Columns carved out of the leading identity matrix.
const ID_HEADERS: [&str; 3] = [SAVE_POINT_ID, SAVE_POINT_LAT, SAVE_POINT_LON];

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let Some(Entry::Dataset(first)) = file.first_entry() else {
        return UnsupportedLayoutSnafu {
            version: file.format_version(),
            type_tag: identity.type_tag.clone(),
            detail: "the first entry must be the save-point identity matrix",
        }
        .fail();
    };
    let (rows, cols_n, values) = first.to_matrix("save-point matrix").context(SourceSnafu)?;
    ensure!(
        cols_n >= ID_HEADERS.len(),
        super::LengthMismatchSnafu {
            name: "save-point matrix",
            expected: ID_HEADERS.len(),
            found: cols_n,
        }
    );

    let group_datasets: usize = file.groups().map(|(_, g)| g.datasets().len()).sum();
    sink.begin(ID_HEADERS.len() + group_datasets + 1 + opts.trailing_steps);

    let mut columns = Columns::new();
    for (j, &name) in ID_HEADERS.iter().enumerate() {
        let col: Vec<f64> = values.chunks_exact(cols_n).map(|row| row[j]).collect();
        if j == 0 {
            columns.push_int(name, col.into_iter().map(|v| v as i64).collect());
        } else {
            columns.push_float(name, col);
        }
        sink.step(j + 1);
    }

    let mut step = ID_HEADERS.len();
    for (_, group) in file.groups() {
        for (name, dataset) in group.datasets() {
            let col = dataset.to_floats(name).context(SourceSnafu)?;
            ensure_len(name, rows, col.len())?;
            columns.push_float(name.clone(), col);
            step += 1;
            sink.step(step);
        }
    }
    ensure!(
        columns.len() > ID_HEADERS.len(),
        MissingDatasetSnafu {
            name: "response ratios",
        }
    );

    let normal = columns.finish().context(ArrowSnafu)?;
    sink.step(step + 1);

    Ok(ConvertedDataset::from_normal(
        &identity.stem,
        &identity.type_tag,
        normal,
        Default::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;
    use crate::source::{AttrMap, DataArray, Dataset, SourceGroup};
    use crate::table;

    fn srr_file() -> SourceFile {
        let mut file = SourceFile::new(AttrMap::new());
        file.push_dataset(
            "Save Points",
            Dataset::new(DataArray::Matrix {
                rows: 2,
                cols: 3,
                values: vec![
                    11.0, 29.0, -90.0, //
                    12.0, 29.5, -90.5,
                ],
            }),
        );
        let mut g = SourceGroup::default();
        g.push_dataset("SRR 2 Percent", Dataset::new(DataArray::Floats(vec![0.8, 0.9])));
        g.push_dataset("SRR 10 Percent", Dataset::new(DataArray::Floats(vec![0.6, 0.7])));
        file.push_group("Ratios", g);
        file
    }

    fn identity() -> FileIdentity {
        FileIdentity::parse("NACCS_a_b_c_d_e_SRR").unwrap()
    }

    #[test]
    fn carves_identity_matrix_and_group_columns() {
        let mut sink = RecordingSink::default();
        let ds = build(
            &srr_file(),
            &identity(),
            &BuildOptions::default(),
            &mut sink,
        )
        .unwrap();

        let normal = ds.normal_table().unwrap();
        assert_eq!(normal.num_rows(), 2);
        assert_eq!(normal.num_columns(), 5);

        let ids: Vec<i64> = table::int_column(normal, SAVE_POINT_ID)
            .unwrap()
            .values()
            .to_vec();
        assert_eq!(ids, vec![11, 12]);
        assert_eq!(
            table::float_values(normal, "SRR 10 Percent").unwrap(),
            vec![0.6, 0.7]
        );
        assert!(ds.variable_ranges().is_empty());
        assert!(sink.is_complete());
    }

    #[test]
    fn group_less_file_errors() {
        let mut file = SourceFile::new(AttrMap::new());
        file.push_dataset(
            "Save Points",
            Dataset::new(DataArray::Matrix {
                rows: 1,
                cols: 3,
                values: vec![11.0, 29.0, -90.0],
            }),
        );
        let err = build(
            &file,
            &identity(),
            &BuildOptions::default(),
            &mut RecordingSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MissingDataset { .. }));
    }

    #[test]
    fn flat_first_entry_of_wrong_rank_errors() {
        let mut file = SourceFile::new(AttrMap::new());
        file.push_dataset(
            "Save Points",
            Dataset::new(DataArray::Floats(vec![11.0])),
        );
        let err = build(
            &file,
            &identity(),
            &BuildOptions::default(),
            &mut RecordingSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Source { .. }));
    }
}
