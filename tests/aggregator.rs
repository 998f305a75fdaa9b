// tests/aggregator.rs

use std::path::{Path, PathBuf};

use hpf_binner::data::export::TABLE_FILE;
use hpf_binner::data::loader::load_table;
use hpf_binner::{Aggregator, BinError, Skip, Statistic, TIME_COLUMN, TreatmentMap};

/// Writes an ImageJ-style table: blank-header index column, then Mean.
fn write_intensity(dir: &Path, name: &str, means: &[f64]) -> PathBuf {
    let path = dir.join(name);
    let mut text = String::from(" ,Area,Mean\n");
    for (i, m) in means.iter().enumerate() {
        text.push_str(&format!("{},100,{m}\n", i + 1));
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn control_treated() -> TreatmentMap {
    TreatmentMap::new([("Control", vec![3]), ("Treated", vec![6])]).unwrap()
}

#[test]
fn two_files_on_hour_grid() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = vec![
        write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0, 2.0, 3.0, 4.0, 5.0]),
        write_intensity(dir.path(), "2024-01-01_Pos006_X.csv", &[10.0, 20.0, 30.0, 40.0, 50.0]),
    ];
    let mut agg =
        Aggregator::new(files, vec![4.0, 5.0, 6.0], &out, control_treated(), 3600.0).unwrap();

    let (table, report) = agg.process(&Statistic::default()).unwrap();
    assert_eq!(
        table.headers(),
        vec![
            TIME_COLUMN,
            "Control_Mean_2024-01-01_Pos003",
            "Treated_Mean_2024-01-01_Pos006"
        ]
    );
    assert_eq!(table.time(), &[4.5, 5.5]);
    // Rows sit at 4, 5, 6, 7, 8 hpf: every one is on an edge or outside.
    for column in table.columns() {
        assert!(column.values.iter().all(|v| v.is_nan()), "{}", column.name);
    }
    assert!(report.skipped.is_empty());
    assert_eq!(report.table_path, out.join(TABLE_FILE));

    let written = load_table(&out.join(TABLE_FILE)).unwrap();
    assert_eq!(written.n_columns(), 2);
}

#[test]
fn half_hour_grid_fills_bins() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        // times 4.0, 4.5, 5.0, 5.5, 6.0
        write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0, 2.0, 3.0, 4.0, 5.0]),
    ];
    let mut agg =
        Aggregator::new(files, vec![4.0, 5.0, 6.0], dir.path(), control_treated(), 1800.0)
            .unwrap();
    let (table, _) = agg.process(&Statistic::default()).unwrap();
    assert_eq!(
        table.column("Control_Mean_2024-01-01_Pos003").unwrap(),
        &[2.0, 4.0]
    );
    assert_eq!(agg.index().columns("Control"), ["Control_Mean_2024-01-01_Pos003"]);
    assert!(agg.index().columns("Treated").is_empty());
}

#[test]
fn unknown_position_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        write_intensity(dir.path(), "2024-01-01_Pos004_X.csv", &[1.0, 2.0]),
        write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0, 2.0]),
    ];
    let mut agg =
        Aggregator::new(files, vec![4.0, 5.0], dir.path(), control_treated(), 1800.0).unwrap();
    let (table, report) = agg.process(&Statistic::default()).unwrap();
    assert_eq!(table.n_columns(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(matches!(
        report.skipped[0],
        Skip::UnknownPosition { position: 4, .. }
    ));
}

#[test]
fn reingesting_keeps_existing_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0, 2.0, 3.0]);
    let mut agg = Aggregator::new(
        vec![path.clone()],
        vec![4.0, 5.0],
        dir.path(),
        control_treated(),
        1800.0,
    )
    .unwrap();
    agg.process(&Statistic::default()).unwrap();
    let before = agg.table().column("Control_Mean_2024-01-01_Pos003").unwrap().to_vec();

    // Same name, different readings: the first derivation stays.
    write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[100.0, 200.0, 300.0]);
    let (table, report) = agg.process(&Statistic::default()).unwrap();
    assert_eq!(table.n_columns(), 1);
    assert_eq!(table.column("Control_Mean_2024-01-01_Pos003").unwrap(), before.as_slice());
    assert_eq!(
        report.skipped,
        vec![Skip::DuplicateColumn {
            path,
            column: "Control_Mean_2024-01-01_Pos003".into()
        }]
    );
    assert_eq!(agg.index().columns("Control").len(), 1);
}

#[test]
fn other_statistic_coexists() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0, 2.0, 9.0, 4.0]);
    let mut agg =
        Aggregator::new(vec![path], vec![4.0, 6.0], dir.path(), control_treated(), 1800.0)
            .unwrap();
    agg.process(&Statistic::default()).unwrap();
    let median = Statistic::new("Median", "Mean", hpf_binner::data::stats::median);
    let (table, report) = agg.process(&median).unwrap();
    assert!(report.skipped.is_empty());
    // times 4.5, 5.0, 5.5 fall inside (4, 6); readings 2, 9, 4
    assert_eq!(table.column("Control_Mean_2024-01-01_Pos003").unwrap(), &[5.0]);
    assert_eq!(table.column("Control_Median_2024-01-01_Pos003").unwrap(), &[4.0]);
}

#[test]
fn bad_edges_fail_before_files() {
    let missing = vec![PathBuf::from("/nonexistent/2024_Pos003.csv")];
    let err = Aggregator::new(missing.clone(), vec![4.0], "out", control_treated(), 60.0)
        .err()
        .unwrap();
    assert_eq!(err, BinError::TooFewEdges(1));
    let err = Aggregator::new(missing, vec![5.0, 4.0], "out", control_treated(), 60.0)
        .err()
        .unwrap();
    assert!(matches!(err, BinError::NonIncreasingEdges { .. }));
}

#[test]
fn malformed_name_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = vec![
        write_intensity(dir.path(), "2024-01-01_Pos003_X.csv", &[1.0]),
        write_intensity(dir.path(), "2024-01-01_embryo.csv", &[1.0]),
    ];
    let mut agg = Aggregator::new(files, vec![4.0, 5.0], &out, control_treated(), 60.0).unwrap();
    let err = agg.process(&Statistic::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BinError>(),
        Some(BinError::MissingPosMarker(_))
    ));
    assert_eq!(agg.table().n_columns(), 0);
    assert!(!out.exists());
}

#[test]
fn import_without_time_column_changes_nothing() {
    let mut agg =
        Aggregator::new(Vec::new(), vec![4.0, 5.0], "out", control_treated(), 60.0).unwrap();
    agg.import(vec![
        (TIME_COLUMN.into(), vec![4.5]),
        ("Control_Mean_d_Pos003".into(), vec![1.0]),
    ])
    .unwrap();

    let err = agg
        .import(vec![("Treated_Mean_d_Pos006".into(), vec![2.0])])
        .unwrap_err();
    assert_eq!(err, BinError::MissingTimeColumn(TIME_COLUMN.into()));
    assert_eq!(agg.table().headers(), vec![TIME_COLUMN, "Control_Mean_d_Pos003"]);
    assert_eq!(agg.index().columns("Control"), ["Control_Mean_d_Pos003"]);
    assert!(agg.index().columns("Treated").is_empty());
}

#[test]
fn import_rebuilds_index_from_prefixes() {
    let map = TreatmentMap::new([("Control", vec![3]), ("K4K8MO", vec![6]), ("Rescue", vec![8])])
        .unwrap();
    let mut agg = Aggregator::new(Vec::new(), vec![4.0, 5.0], "out", map, 60.0).unwrap();
    agg.import(vec![
        ("Control_Mean_a_Pos003".into(), vec![1.0]),
        (TIME_COLUMN.into(), vec![4.5]),
        ("Rescue_Mean_a_Pos008".into(), vec![2.0]),
        ("Unlabelled".into(), vec![3.0]),
        ("K4K8MO_Mean_a_Pos006".into(), vec![4.0]),
    ])
    .unwrap();
    assert_eq!(agg.table().headers()[0], TIME_COLUMN);
    assert_eq!(agg.index().columns("Control"), ["Control_Mean_a_Pos003"]);
    assert_eq!(agg.index().columns("K4K8MO"), ["K4K8MO_Mean_a_Pos006"]);
    assert_eq!(agg.index().columns("Rescue"), ["Rescue_Mean_a_Pos008"]);
    let grouped: usize = agg.index().iter().map(|(_, c)| c.len()).sum();
    assert_eq!(grouped, 3);
}

#[test]
fn group_summary_is_pairwise_complete() {
    let map = TreatmentMap::new([("Control", vec![1, 2, 3]), ("Empty", vec![9])]).unwrap();
    let mut agg = Aggregator::new(Vec::new(), vec![4.0, 5.0, 6.0], "out", map, 60.0).unwrap();
    agg.import(vec![
        (TIME_COLUMN.into(), vec![4.5, 5.5]),
        ("Control_Mean_d_Pos001".into(), vec![1.0, 4.0]),
        ("Control_Mean_d_Pos002".into(), vec![2.0, f64::NAN]),
        ("Control_Mean_d_Pos003".into(), vec![3.0, 8.0]),
    ])
    .unwrap();

    let groups = agg.summaries();
    assert_eq!(groups.len(), 1, "treatments without columns are left out");
    let g = &groups[0];
    assert_eq!(g.treatment, "Control");
    assert_eq!(g.count, vec![3, 2]);
    assert!((g.mean[0] - 2.0).abs() < 1e-12);
    assert!((g.sem[0] - 1.0 / 3f64.sqrt()).abs() < 1e-12);
    // row 2: [4, 8] → mean 6, sd sqrt(8), sem sqrt(8)/sqrt(2) = 2
    assert!((g.mean[1] - 6.0).abs() < 1e-12);
    assert!((g.sem[1] - 2.0).abs() < 1e-12);
}

#[test]
fn all_missing_row_stays_missing() {
    let map = TreatmentMap::new([("A", vec![1, 2])]).unwrap();
    let mut agg = Aggregator::new(Vec::new(), vec![4.0, 5.0], "out", map, 60.0).unwrap();
    agg.import(vec![
        (TIME_COLUMN.into(), vec![4.5]),
        ("A_x_1".into(), vec![f64::NAN]),
        ("A_x_2".into(), vec![f64::NAN]),
    ])
    .unwrap();
    let g = &agg.summaries()[0];
    assert!(g.mean[0].is_nan());
    assert!(g.sem[0].is_nan());
    assert_eq!(g.count[0], 0);
}
