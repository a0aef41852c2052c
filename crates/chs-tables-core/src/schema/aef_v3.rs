//! V3 AEF products: flattened node-by-frequency table.
//!
//! V3 AEF files store a node-ID vector, a frequency vector, and one or
//! more `nodes x frequencies` matrices. The output is one row per
//! `(node, frequency)` cell: node IDs are repeated across the frequency
//! axis, the frequency row is tiled across nodes, and every remaining
//! top-level dataset is flattened row-major as a pass-through column.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges;
use crate::source::SourceFile;
use crate::table::Columns;

use super::{
    ensure_len, ArrowSnafu, BuildOptions, LengthMismatchSnafu, MissingDatasetSnafu, SchemaError,
    SourceSnafu,
};

/// Dataset naming the mesh nodes.
const NODE_IDS: &str = "ADCIRC Node IDs";
/// Dataset naming the annual exceedance frequencies.
const AEF_VALUES: &str = "AEF Values";
/// The matrix whose shape fixes the `(node, frequency)` grid.
const BEST_ESTIMATE: &str = "Best Estimate AEF";
/// Output column of node identifiers.
const NODE_ID_COLUMN: &str = "ADCIRC Node ID";
/// Output column of frequencies.
const AEF_COLUMN: &str = "AEF Value";

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let best = file
        .dataset(BEST_ESTIMATE)
        .context(MissingDatasetSnafu { name: BEST_ESTIMATE })?;
    let (rows, cols_n, _) = best.to_matrix(BEST_ESTIMATE).context(SourceSnafu)?;

    let node_ids = file
        .dataset(NODE_IDS)
        .context(MissingDatasetSnafu { name: NODE_IDS })?
        .to_ints(NODE_IDS)
        .context(SourceSnafu)?;
    ensure_len(NODE_IDS, rows, node_ids.len())?;

    let aef = file
        .dataset(AEF_VALUES)
        .context(MissingDatasetSnafu { name: AEF_VALUES })?;
    let (_, aef_cols, aef_values) = aef.to_matrix(AEF_VALUES).context(SourceSnafu)?;
    ensure_len(AEF_VALUES, cols_n, aef_cols)?;
    ensure!(
        aef_values.len() >= aef_cols,
        LengthMismatchSnafu {
            name: AEF_VALUES,
            expected: aef_cols,
            found: aef_values.len(),
        }
    );
    let aef_row: &[f64] = &aef_values[..aef_cols];

    // Pass-through columns: every top-level dataset after the two seed
    // arrays, flattened row-major to one value per (node, frequency).
    let pass_through: Vec<&str> = file
        .dataset_names()
        .filter(|&n| n != NODE_IDS && n != AEF_VALUES)
        .collect();

    let total_cells = rows * cols_n;
    let header_count = 2 + pass_through.len();
    let range_steps = usize::from(opts.build_ranges);
    sink.begin(header_count + range_steps + opts.trailing_steps);

    let mut columns = Columns::new();
    // Node IDs repeat each value across the frequency axis.
    let mut id_col = Vec::with_capacity(total_cells);
    for &id in &node_ids {
        id_col.extend(std::iter::repeat(id).take(cols_n));
    }
    columns.push_int(NODE_ID_COLUMN, id_col);
    sink.step(1);

    // The frequency row tiles across the node axis.
    let mut aef_col = Vec::with_capacity(total_cells);
    for _ in 0..rows {
        aef_col.extend_from_slice(aef_row);
    }
    columns.push_float(AEF_COLUMN, aef_col);
    sink.step(2);

    for (i, &name) in pass_through.iter().enumerate() {
        let dataset = file
            .dataset(name)
            .context(MissingDatasetSnafu { name })?;
        let flat = dataset.to_floats(name).context(SourceSnafu)?;
        ensure_len(name, total_cells, flat.len())?;
        columns.push_float(name, flat);
        sink.step(3 + i);
    }

    let normal = columns.finish().context(ArrowSnafu)?;

    let variable_ranges = if opts.build_ranges {
        let candidates = std::iter::once(AEF_COLUMN).chain(pass_through.iter().copied());
        let ranges = ranges::index_columns(&normal, candidates);
        sink.step(header_count + 1);
        ranges
    } else {
        Default::default()
    };

    Ok(ConvertedDataset::from_normal(
        &identity.stem,
        &identity.type_tag,
        normal,
        variable_ranges,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;
    use crate::source::{AttrMap, AttrValue, DataArray, Dataset, FORMAT_ATTR};
    use crate::table;

    fn v3_file() -> SourceFile {
        let mut attrs = AttrMap::new();
        attrs.insert(FORMAT_ATTR.to_string(), AttrValue::Text("V3".to_string()));
        let mut file = SourceFile::new(attrs);
        file.push_dataset(NODE_IDS, Dataset::new(DataArray::Ints(vec![11, 22])));
        file.push_dataset(
            AEF_VALUES,
            Dataset::new(DataArray::Matrix {
                rows: 1,
                cols: 3,
                values: vec![0.1, 0.01, 0.001],
            }),
        );
        file.push_dataset(
            BEST_ESTIMATE,
            Dataset::new(DataArray::Matrix {
                rows: 2,
                cols: 3,
                values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            }),
        );
        file
    }

    fn identity() -> FileIdentity {
        FileIdentity::parse("CHS-TX_a_b_c_d_e_AEF").unwrap()
    }

    #[test]
    fn flattens_nodes_by_frequencies() {
        let file = v3_file();
        let opts = BuildOptions {
            build_ranges: true,
            trailing_steps: 0,
        };
        let mut sink = RecordingSink::default();
        let ds = build(&file, &identity(), &opts, &mut sink).unwrap();

        let normal = ds.normal_table().unwrap();
        assert_eq!(normal.num_rows(), 6);
        assert_eq!(normal.num_columns(), 3);

        let ids = table::int_column(normal, NODE_ID_COLUMN).unwrap();
        let ids: Vec<i64> = ids.values().to_vec();
        assert_eq!(ids, vec![11, 11, 11, 22, 22, 22]);

        let aef = table::float_values(normal, AEF_COLUMN).unwrap();
        assert_eq!(aef, vec![0.1, 0.01, 0.001, 0.1, 0.01, 0.001]);

        let best = table::float_values(normal, BEST_ESTIMATE).unwrap();
        assert_eq!(best, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        // Node ID is not a range candidate; the other two columns are.
        assert_eq!(ds.variable_ranges().len(), 2);
        assert!(!ds.variable_ranges().contains_key(NODE_ID_COLUMN));
        assert!(sink.is_complete());
    }

    #[test]
    fn missing_seed_array_errors() {
        let mut attrs = AttrMap::new();
        attrs.insert(FORMAT_ATTR.to_string(), AttrValue::Text("V3".to_string()));
        let file = SourceFile::new(attrs);
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
    fn mismatched_node_count_errors() {
        let mut file = v3_file();
        // Replace node IDs with a vector of the wrong length by pushing a
        // fresh file.
        let mut bad = SourceFile::new(file.attrs.clone());
        bad.push_dataset(NODE_IDS, Dataset::new(DataArray::Ints(vec![11])));
        for (name, entry) in file.entries() {
            if name.as_str() != NODE_IDS {
                if let crate::source::Entry::Dataset(d) = entry {
                    bad.push_dataset(name.clone(), d.clone());
                }
            }
        }
        file = bad;
        let err = build(
            &file,
            &identity(),
            &BuildOptions::default(),
            &mut RecordingSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::LengthMismatch { .. }));
    }
}
