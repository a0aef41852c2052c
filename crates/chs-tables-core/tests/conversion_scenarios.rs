//! End-to-end conversion scenarios over in-memory source containers.

use std::fs::File;
use std::sync::Arc;

use chs_tables_core::convert::{ConvertOptions, Converter};
use chs_tables_core::filter::FilterEngine;
use chs_tables_core::progress::RecordingSink;
use chs_tables_core::ranges::RangeBound;
use chs_tables_core::source::{AttrMap, AttrValue, DataArray, Dataset, SourceFile, SourceGroup};
use chs_tables_core::{export, table};

const STORM_ID: &str = "Storm ID";
const TIME_COLUMN: &str = "yyyymmddHHMM";

fn storm_group(id: i64, start_hour: u32, samples: usize) -> SourceGroup {
    let mut attrs = AttrMap::new();
    attrs.insert("Save Point Depth".to_string(), AttrValue::Float(-6.0));
    attrs.insert(STORM_ID.to_string(), AttrValue::Int(id));
    attrs.insert(
        "Storm Name".to_string(),
        AttrValue::Text(format!("SYNTH {id}")),
    );
    let mut group = SourceGroup::new(attrs);
    let surge: Vec<f64> = (0..samples).map(|i| id as f64 + i as f64 * 0.5).collect();
    let times: Vec<f64> = (0..samples)
        .map(|i| 200106050000.0 + (start_hour as f64 + i as f64) * 100.0)
        .collect();
    group.push_dataset("Surge", Dataset::new(DataArray::Floats(surge)));
    group.push_dataset(TIME_COLUMN, Dataset::new(DataArray::Floats(times)));
    group
}

fn timeseries_file(counts: &[(i64, usize)]) -> SourceFile {
    let mut attrs = AttrMap::new();
    attrs.insert("Save Point ID".to_string(), AttrValue::Int(777));
    attrs.insert("Save Point Latitude".to_string(), AttrValue::Float(27.9));
    attrs.insert("Save Point Longitude".to_string(), AttrValue::Float(-82.5));
    let mut file = SourceFile::new(attrs);
    for &(id, samples) in counts {
        file.push_group(format!("Storm {id}"), storm_group(id, 0, samples));
    }
    file
}

fn interactive_converter(dir: &std::path::Path, export: bool) -> Converter {
    Converter::new(ConvertOptions {
        export_on_finish: export,
        interactive: true,
        results_dir: dir.to_path_buf(),
    })
}

#[test]
fn two_storm_timeseries_has_expected_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let converter = interactive_converter(dir.path(), false);
    let mut sink = RecordingSink::default();
    let file = timeseries_file(&[(205, 3), (101, 5)]);
    let ds = converter
        .convert_source(&file, "NACCS_ATL_2015_Base_SP_V1_Timeseries", &mut sink)
        .unwrap();

    assert_eq!(ds.normal_table().unwrap().num_rows(), 2);
    let full = ds.full_table().unwrap();
    assert_eq!(full.num_rows(), 8);

    // All of storm 101 precedes all of storm 205.
    let ids: Vec<i64> = table::int_column(full, STORM_ID).unwrap().values().to_vec();
    assert_eq!(ids, vec![101, 101, 101, 101, 101, 205, 205, 205]);

    // Timestamps ascend within each storm.
    let ts = table::time_column(full, TIME_COLUMN).unwrap();
    for i in 1..5 {
        assert!(ts.value(i) > ts.value(i - 1));
    }

    let storms: Vec<String> = ds.ranges_by_storm().keys().cloned().collect();
    assert_eq!(storms, vec!["101".to_string(), "205".to_string()]);
    assert!(sink.is_complete());
}

#[test]
fn locations_split_exports_both_children() {
    let mut file = SourceFile::new(AttrMap::new());
    file.push_dataset(
        "Nodes",
        Dataset::new(DataArray::Matrix {
            rows: 3,
            cols: 4,
            values: vec![
                1.0, 29.0, -90.0, -1.0, //
                2.0, 29.1, -90.1, -2.0, //
                3.0, 29.2, -90.2, -3.0,
            ],
        }),
    );
    file.push_dataset(
        "Elements",
        Dataset::new(DataArray::Matrix {
            rows: 2,
            cols: 5,
            values: vec![
                1.0, 3.0, 1.0, 2.0, 3.0, //
                2.0, 3.0, 2.0, 3.0, 1.0,
            ],
        }),
    );

    let dir = tempfile::tempdir().unwrap();
    let converter = interactive_converter(dir.path(), true);
    let stem = "CHS-LA_MESH_2020_Base_SP_V1_Locations";
    let ds = converter
        .convert_source(&file, stem, &mut RecordingSink::default())
        .unwrap();

    assert!(ds.is_split);
    let names: Vec<&str> = ds.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec![format!("{stem}^Nodes"), format!("{stem}^Elements")]);

    let nodes = &ds.children()[0];
    assert_eq!(nodes.normal_table().unwrap().num_columns(), 4);
    let elements = &ds.children()[1];
    assert!(elements
        .normal_table()
        .unwrap()
        .column_by_name("Number of nodes")
        .is_none());

    assert!(dir.path().join(format!("{stem}^Nodes.csv")).exists());
    assert!(dir.path().join(format!("{stem}^Elements.csv")).exists());
}

#[test]
fn plot_series_step_indices_restart_per_storm() {
    let dir = tempfile::tempdir().unwrap();
    let converter = interactive_converter(dir.path(), false);
    let file = timeseries_file(&[(7, 4), (8, 6), (9, 2)]);
    let ds = converter
        .convert_source(
            &file,
            "NACCS_ATL_2015_Base_SP_V1_Timeseries",
            &mut RecordingSink::default(),
        )
        .unwrap();

    let engine = FilterEngine::new(&ds).unwrap();
    let series = engine.plot_series("Surge", None, &[7, 8, 9], false).unwrap();

    let steps: Vec<i64> = table::int_column(&series, "Time Step")
        .unwrap()
        .values()
        .to_vec();
    let expected: Vec<i64> = (1..=4).chain(1..=6).chain(1..=2).collect();
    assert_eq!(steps, expected);
}

#[test]
fn csv_round_trip_preserves_rows_and_cells() {
    let mut file = SourceFile::new(AttrMap::new());
    file.push_dataset("Save Point ID", Dataset::new(DataArray::Ints(vec![1, 2, 3])));
    file.push_dataset(
        "Save Point Latitude",
        Dataset::new(DataArray::Floats(vec![29.0, 29.5, 30.0])),
    );
    file.push_dataset(
        "Save Point Longitude",
        Dataset::new(DataArray::Floats(vec![-90.0, -90.5, -91.0])),
    );
    file.push_dataset(
        "Response",
        Dataset::new(DataArray::Floats(vec![0.25, 0.5, 0.75])),
    );

    let dir = tempfile::tempdir().unwrap();
    let converter = interactive_converter(dir.path(), false);
    let ds = converter
        .convert_source(
            &file,
            "NACCS_ATL_2015_Base_SP_V1_NLR",
            &mut RecordingSink::default(),
        )
        .unwrap();

    let written = export::export_full(&ds, dir.path()).unwrap();
    assert_eq!(written.len(), 1);

    let original = ds.normal_table().unwrap();
    let reader = arrow::csv::ReaderBuilder::new(Arc::new(original.schema().as_ref().clone()))
        .with_header(true)
        .build(File::open(&written[0]).unwrap())
        .unwrap();
    let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(&batches[0], original);
}

#[test]
fn filter_then_export_current_uses_storm_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let converter = interactive_converter(dir.path(), false);
    let file = timeseries_file(&[(101, 5), (205, 3)]);
    let ds = converter
        .convert_source(
            &file,
            "NACCS_ATL_2015_Base_SP_V1_Timeseries",
            &mut RecordingSink::default(),
        )
        .unwrap();

    let mut engine = FilterEngine::new(&ds).unwrap();
    engine.apply_storm_filter(205).unwrap();
    engine
        .apply_range_filter(
            "Surge",
            &RangeBound::Numeric {
                min: 205.0,
                max: 205.5,
            },
            false,
        )
        .unwrap();
    assert_eq!(engine.current().num_rows(), 2);

    let path = export::export_current(&engine, dir.path()).unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("^205.csv"));

    // The current view is always a subset of the backing table.
    assert!(engine.current().num_rows() <= ds.full_table().unwrap().num_rows());
}
