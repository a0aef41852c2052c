//! V1 `Locations` mesh files: split into `Nodes` and `Elements` children.
//!
//! A locations file carries two 2-D datasets describing the ADCIRC mesh.
//! `Nodes` is an `n x 4` matrix of node ID, latitude, longitude, and
//! datum depth; `Elements` is an `n x m` all-integer matrix whose second
//! column (the per-element node count) is redundant for triangular
//! meshes and is dropped. Each matrix becomes its own child dataset named
//! `<stem>^Nodes` / `<stem>^Elements`, so downstream export produces two
//! tables from one source file.

use snafu::prelude::*;

use crate::dataset::ConvertedDataset;
use crate::identity::FileIdentity;
use crate::progress::ProgressSink;
use crate::ranges;
use crate::source::SourceFile;
use crate::table::Columns;

use super::{ensure_len, ArrowSnafu, BuildOptions, MissingDatasetSnafu, SchemaError, SourceSnafu};

/// Source matrix of mesh nodes.
const NODES: &str = "Nodes";
/// Source matrix of mesh elements.
const ELEMENTS: &str = "Elements";

/// Fixed column headers of the `Nodes` child.
const NODE_HEADERS: [&str; 4] = ["ADCIRC Node ID", "Latitude", "Longitude", "Datum Depth"];
/// Leading column of the `Elements` child.
const ELEMENT_ID: &str = "Triangular element ID";

/// Extract column `j` of a row-major matrix.
fn matrix_column(values: &[f64], cols: usize, j: usize) -> Vec<f64> {
    values.chunks_exact(cols).map(|row| row[j]).collect()
}

pub(crate) fn build(
    file: &SourceFile,
    identity: &FileIdentity,
    opts: &BuildOptions,
    sink: &mut dyn ProgressSink,
) -> Result<ConvertedDataset, SchemaError> {
    let range_steps = usize::from(opts.build_ranges);
    sink.begin(2 + 2 * range_steps + opts.trailing_steps);
    let mut step = 0;
    let mut next = || {
        step += 1;
        step
    };

    // Nodes child: fixed four-column layout, ID column narrowed to int.
    let nodes = file
        .dataset(NODES)
        .context(MissingDatasetSnafu { name: NODES })?;
    let (_, node_cols, node_values) = nodes.to_matrix(NODES).context(SourceSnafu)?;
    ensure_len(NODES, NODE_HEADERS.len(), node_cols)?;

    let mut columns = Columns::new();
    let ids = matrix_column(node_values, node_cols, 0);
    columns.push_int(NODE_HEADERS[0], ids.into_iter().map(|v| v as i64).collect());
    for (j, &name) in NODE_HEADERS.iter().enumerate().skip(1) {
        columns.push_float(name, matrix_column(node_values, node_cols, j));
    }
    let node_batch = columns.finish().context(ArrowSnafu)?;
    sink.step(next());

    let node_ranges = if opts.build_ranges {
        let r = ranges::index_columns(&node_batch, NODE_HEADERS.iter().copied());
        sink.step(next());
        r
    } else {
        Default::default()
    };
    let node_child = ConvertedDataset::from_normal(
        format!("{}^{NODES}", identity.stem),
        &identity.type_tag,
        node_batch,
        node_ranges,
    );

    // Elements child: all-integer matrix; the node-count column adds no
    // information for a triangular mesh and is dropped.
    let elements = file
        .dataset(ELEMENTS)
        .context(MissingDatasetSnafu { name: ELEMENTS })?;
    let (_, elem_cols, elem_values) = elements.to_matrix(ELEMENTS).context(SourceSnafu)?;
    ensure!(
        elem_cols >= 3,
        super::LengthMismatchSnafu {
            name: ELEMENTS,
            expected: 3usize,
            found: elem_cols,
        }
    );

    let mut headers = vec![ELEMENT_ID.to_string()];
    headers.extend((1..elem_cols - 1).map(|i| format!("Node ID {i}")));

    let mut columns = Columns::new();
    let id_col = matrix_column(elem_values, elem_cols, 0);
    columns.push_int(&headers[0], id_col.into_iter().map(|v| v as i64).collect());
    for (name, j) in headers[1..].iter().zip(2..elem_cols) {
        let col = matrix_column(elem_values, elem_cols, j);
        columns.push_int(name.clone(), col.into_iter().map(|v| v as i64).collect());
    }
    let elem_batch = columns.finish().context(ArrowSnafu)?;
    sink.step(next());

    let elem_ranges = if opts.build_ranges {
        let r = ranges::index_columns(&elem_batch, headers.iter().map(String::as_str));
        sink.step(next());
        r
    } else {
        Default::default()
    };
    let elem_child = ConvertedDataset::from_normal(
        format!("{}^{ELEMENTS}", identity.stem),
        &identity.type_tag,
        elem_batch,
        elem_ranges,
    );

    Ok(ConvertedDataset::split(
        &identity.stem,
        &identity.type_tag,
        vec![node_child, elem_child],
    ))
}
