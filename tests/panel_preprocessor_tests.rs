use chrono::{Datelike, NaiveDate};

use valuation_forecast::panel::{
    prepare, prepare_windows, PanelPreprocessor, Partition, PreprocessorSettings, WidePanel,
    FEATURE_WARMUP,
};
use valuation_forecast::ForecastError;

fn month_end(i: usize) -> NaiveDate {
    let year = 2010 + (i / 12) as i32;
    let month = (i % 12) as u32 + 1;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.unwrap().pred_opt().unwrap()
}

fn series(base: f64, n: usize) -> Vec<Option<f64>> {
    (0..n)
        .map(|i| Some(base + 750.0 * i as f64 + 4_000.0 * (i as f64 * 0.5).sin()))
        .collect()
}

fn table_csv(n: usize, rows: &[(&str, Vec<Option<f64>>)]) -> String {
    let mut out = String::from("RegionID,RegionName,State");
    for i in 0..n {
        out.push_str(&format!(",{}", month_end(i)));
    }
    out.push('\n');
    for (idx, (entity, values)) in rows.iter().enumerate() {
        out.push_str(&format!("{},{},NJ", idx + 1, entity));
        for value in values {
            match value {
                Some(v) => out.push_str(&format!(",{}", v)),
                None => out.push(','),
            }
        }
        out.push('\n');
    }
    out
}

fn wide_table(n: usize, rows: &[(&str, Vec<Option<f64>>)]) -> WidePanel {
    WidePanel::from_reader(table_csv(n, rows).as_bytes(), "RegionName", "synthetic")
        .expect("synthetic table should parse")
}

fn three_entities(n: usize) -> Vec<(&'static str, Vec<Option<f64>>)> {
    vec![
        ("94110", series(900_000.0, n)),
        ("8701", series(350_000.0, n)),
        ("10001", series(1_200_000.0, n)),
    ]
}

#[test]
/// Entities with any gap never reach the long panel; survivors keep every
/// dated column minus the feature warmup.
fn incomplete_entities_are_dropped() {
    let n = 40;
    let mut gappy = series(500_000.0, n);
    gappy[5] = None;
    let wide = wide_table(
        n,
        &[
            ("8701", series(350_000.0, n)),
            ("10001", gappy),
            ("94110", series(900_000.0, n)),
        ],
    );

    let windowed = prepare_windows(&wide, &PreprocessorSettings::new(6, 3))
        .expect("windowing should succeed");
    assert_eq!(windowed.lookup().len(), 2);
    assert!(windowed.lookup().code("10001").is_none());
    for entity in ["8701", "94110"] {
        let rows = windowed.entity_records(entity).expect("entity should be present");
        assert_eq!(rows.len(), n - FEATURE_WARMUP);
    }
    assert!(matches!(
        windowed.require_history("10001"),
        Err(ForecastError::UnknownEntity(_))
    ));
}

#[test]
fn all_incomplete_table_is_data_incomplete() {
    let n = 30;
    let mut a = series(350_000.0, n);
    a[0] = None;
    let mut b = series(900_000.0, n);
    b[n - 1] = None;
    let wide = wide_table(n, &[("8701", a), ("94110", b)]);

    assert!(matches!(
        prepare(&wide, &PreprocessorSettings::new(6, 3)),
        Err(ForecastError::DataIncomplete { .. })
    ));
}

#[test]
/// Entity codes follow numeric order for integer identifiers, not file order.
fn entity_codes_follow_identifier_order() {
    let wide = wide_table(40, &three_entities(40));
    let windowed = prepare_windows(&wide, &PreprocessorSettings::new(6, 3))
        .expect("windowing should succeed");
    assert_eq!(windowed.lookup().code("8701"), Some(0));
    assert_eq!(windowed.lookup().code("10001"), Some(1));
    assert_eq!(windowed.lookup().code("94110"), Some(2));
}

#[test]
/// Perturbing the value at date index k must leave every feature row dated at
/// or before k untouched, and change the row right after it.
fn features_never_see_current_or_future_values() {
    let n = 48;
    let k = 30;
    let original = three_entities(n);
    let mut perturbed = original.clone();
    perturbed[1].1[k] = Some(10_000_000.0);

    let settings = PreprocessorSettings::new(6, 3);
    let before = prepare_windows(&wide_table(n, &original), &settings)
        .expect("windowing should succeed");
    let after = prepare_windows(&wide_table(n, &perturbed), &settings)
        .expect("windowing should succeed");

    let cutoff = month_end(k);
    let rows_before = before.entity_records("8701").expect("entity should be present");
    let rows_after = after.entity_records("8701").expect("entity should be present");
    assert_eq!(rows_before.len(), rows_after.len());

    let mut checked = 0;
    for (a, b) in rows_before.iter().zip(rows_after) {
        assert_eq!(a.record.date, b.record.date);
        if a.record.date <= cutoff {
            assert_eq!(a.features, b.features, "row {} saw the future", a.record.date);
            checked += 1;
        } else if a.record.date == month_end(k + 1) {
            assert_ne!(a.features[0], b.features[0]);
        }
    }
    assert_eq!(checked, k + 1 - FEATURE_WARMUP);
}

#[test]
/// Within each entity, train labels precede validation labels which precede
/// test labels, and no window's label is dated at or before its inputs.
fn splits_are_chronological_per_entity() {
    let wide = wide_table(72, &three_entities(72));
    let prepared = prepare(&wide, &PreprocessorSettings::new(6, 4))
        .expect("preprocessing should succeed");
    let lookback = prepared.settings().lookback;

    for (code, _) in prepared.lookup().iter() {
        let dates_in = |partition: Partition| -> Vec<NaiveDate> {
            prepared
                .partition(partition)
                .filter(|w| w.window.entity_code == code)
                .map(|w| w.window.label_date)
                .collect()
        };
        let train = dates_in(Partition::Train);
        let validation = dates_in(Partition::Validation);
        let test = dates_in(Partition::Test);
        assert!(!train.is_empty() && !validation.is_empty() && !test.is_empty());
        assert!(train.iter().max() < validation.iter().min());
        assert!(validation.iter().max() < test.iter().min());
    }

    for window in prepared.windows() {
        let last_input = &prepared.records()[window.start + lookback - 1];
        assert!(last_input.record.date < window.label_date);
    }
}

#[test]
/// Per entity with n windows the split sizes are floor(0.7n), floor(0.15n) and
/// the remainder.
fn split_sizes_use_floor_per_entity() {
    let n = 60;
    let wide = wide_table(n, &three_entities(n));
    let windowed = prepare_windows(&wide, &PreprocessorSettings::new(6, 3))
        .expect("windowing should succeed");
    let per_entity = n - FEATURE_WARMUP - 6 - 3;
    assert_eq!(windowed.windows().len(), 3 * per_entity);
    let train = (per_entity as f64 * 0.7).floor() as usize;
    let validation = (per_entity as f64 * 0.15).floor() as usize;
    assert_eq!(windowed.splits().train.len(), 3 * train);
    assert_eq!(windowed.splits().validation.len(), 3 * validation);
    assert_eq!(
        windowed.splits().test.len(),
        3 * (per_entity - train - validation)
    );
}

#[test]
/// Scalers map the training partition onto [0, 1] exactly and never move when
/// only held-out data changes.
fn scalers_are_fit_on_training_windows_only() {
    let n = 60;
    let rows = three_entities(n);
    let settings = PreprocessorSettings::new(6, 3);
    let prepared = prepare(&wide_table(n, &rows), &settings).expect("preprocessing should succeed");

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for window in prepared.partition(Partition::Train) {
        for row in window.inputs {
            for value in row {
                assert!((-1e-12..=1.0 + 1e-12).contains(value));
            }
            lo = lo.min(row[0]);
            hi = hi.max(row[0]);
        }
        assert!((-1e-12..=1.0 + 1e-12).contains(&window.label));
    }
    assert!(lo.abs() < 1e-12);
    assert!((hi - 1.0).abs() < 1e-12);

    // the last value of an entity is only ever a test label
    let mut shifted = rows.clone();
    shifted[0].1[n - 1] = Some(50_000_000.0);
    let refit = prepare(&wide_table(n, &shifted), &settings).expect("preprocessing should succeed");
    assert_eq!(
        prepared.feature_scaler().data_min(),
        refit.feature_scaler().data_min()
    );
    assert_eq!(
        prepared.feature_scaler().data_max(),
        refit.feature_scaler().data_max()
    );
    assert_eq!(
        prepared.label_scaler().data_max(),
        refit.label_scaler().data_max()
    );
    assert!(refit
        .partition(Partition::Test)
        .any(|w| w.label > 1.0));
}

#[test]
fn label_scaling_inverts_for_every_partition() {
    let wide = wide_table(60, &three_entities(60));
    let prepared = prepare(&wide, &PreprocessorSettings::new(6, 3))
        .expect("preprocessing should succeed");
    for partition in Partition::ALL {
        for window in prepared.partition(partition) {
            let restored = prepared.inverse_label(window.label);
            assert!((restored - window.window.label).abs() < 1e-6 * window.window.label.abs());
        }
    }
}

#[test]
/// Exactly lookback + horizon + 1 feature rows yield one window per entity;
/// one row fewer yields none and inference reports insufficient history.
fn window_boundary_at_minimum_history() {
    let (lookback, horizon) = (6, 3);
    let settings = PreprocessorSettings::new(lookback, horizon);
    let n = FEATURE_WARMUP + settings.min_entity_rows();

    let windowed = prepare_windows(&wide_table(n, &three_entities(n)), &settings)
        .expect("windowing should succeed");
    assert_eq!(windowed.windows().len(), 3);
    assert_eq!(windowed.entity_windows("8701").expect("entity should be present").count(), 1);
    windowed.require_history("8701").expect("history should be sufficient");
    // a single window per entity always lands in the test partition
    assert!(matches!(
        windowed.fit(),
        Err(ForecastError::EmptyTrainingSet { horizon: 3 })
    ));

    let short = n - 1;
    let windowed = prepare_windows(&wide_table(short, &three_entities(short)), &settings)
        .expect("windowing should succeed");
    assert!(windowed.windows().is_empty());
    match windowed.require_history("8701") {
        Err(ForecastError::InsufficientHistory {
            required,
            available,
            ..
        }) => {
            assert_eq!(required, lookback + horizon + 1);
            assert_eq!(available, lookback + horizon);
        }
        other => panic!("expected InsufficientHistory, got {:?}", other),
    }
}

#[test]
fn latest_window_covers_most_recent_rows() {
    let wide = wide_table(60, &three_entities(60));
    let prepared = prepare(&wide, &PreprocessorSettings::new(6, 3))
        .expect("preprocessing should succeed");
    let window = prepared.latest_window("10001").expect("latest window should exist");
    assert_eq!(window.entity_code, 1);
    assert_eq!(window.inputs.len(), 6);

    let rows = prepared.windowed().entity_records("10001").expect("entity should be present");
    let mut expected = rows[rows.len() - 1].features;
    prepared.feature_scaler().transform_in_place(&mut expected);
    assert_eq!(window.inputs[5], expected);
}

#[test]
fn delta_shifts_every_value_before_features() {
    let n = 40;
    let rows = three_entities(n);
    let wide = wide_table(n, &rows);
    let settings = PreprocessorSettings::new(6, 3);

    let plain = prepare_windows(&wide, &settings).expect("windowing should succeed");
    let shifted = prepare_windows(&wide, &settings.with_delta(1_000.0))
        .expect("windowing should succeed");
    let raw = plain.recent_values("8701", 12).expect("recent values should load");
    let adjusted = shifted.recent_values("8701", 12).expect("recent values should load");
    assert_eq!(raw.len(), 12);
    for (a, b) in raw.iter().zip(&adjusted) {
        assert!((b - a - 1_000.0).abs() < 1e-6);
    }
    assert!((raw[11] - rows[1].1[n - 1].expect("latest value should be present")).abs() < 1e-6);

    let first_plain = &plain.entity_records("8701").expect("entity should be present")[0];
    let first_shifted = &shifted.entity_records("8701").expect("entity should be present")[0];
    let (lag_plain, lag_shifted) = (first_plain.features[0], first_shifted.features[0]);
    assert!((lag_shifted - lag_plain - 1_000.0).abs() < 1e-6);
}

#[test]
fn non_finite_delta_is_rejected() {
    let wide = wide_table(40, &three_entities(40));
    let settings = PreprocessorSettings::new(6, 3).with_delta(f64::NAN);
    assert!(matches!(
        prepare(&wide, &settings),
        Err(ForecastError::InvalidSettings(_))
    ));
}

#[test]
fn preprocessor_reads_table_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("zip_values.csv");
    std::fs::write(&path, table_csv(60, &three_entities(60))).expect("fixture should be written");

    let prepared = PanelPreprocessor::new(&path, PreprocessorSettings::new(6, 3))
        .run()
        .expect("preprocessor run should succeed");
    assert_eq!(prepared.lookup().len(), 3);
    assert!(!prepared.splits().train.is_empty());

    let missing = PanelPreprocessor::new(
        dir.path().join("absent.csv"),
        PreprocessorSettings::new(6, 3),
    );
    assert!(missing.run().is_err());
}

#[test]
/// A table keyed by a differently named identifier column loads once the
/// column is named, and is malformed otherwise.
fn preprocessor_honours_identifier_column() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("zip_values.csv");
    let csv = table_csv(60, &three_entities(60)).replacen("RegionName", "zip", 1);
    std::fs::write(&path, csv).expect("fixture should be written");

    let settings = PreprocessorSettings::new(6, 3);
    let prepared = PanelPreprocessor::new(&path, settings)
        .with_id_column("zip")
        .run()
        .expect("preprocessor run should succeed");
    assert_eq!(prepared.lookup().code("8701"), Some(0));

    assert!(matches!(
        PanelPreprocessor::new(&path, settings).run(),
        Err(ForecastError::MalformedPanel(_))
    ));
}

#[test]
/// A zero price makes a later pct_change infinite. Dropping just that row would
/// let windows straddle a missing month, so the run fails and names the entity
/// and date instead.
fn non_finite_feature_fails_instead_of_leaving_a_gap() {
    let n = 48;
    let mut rows = three_entities(n);
    rows[1].1[25] = Some(0.0);
    let wide = wide_table(n, &rows);

    // row 27 is the first whose lag_2 is the zero
    match prepare_windows(&wide, &PreprocessorSettings::new(6, 3)) {
        Err(ForecastError::MalformedPanel(msg)) => {
            assert!(msg.contains("8701"), "{}", msg);
            assert!(msg.contains(&month_end(27).to_string()), "{}", msg);
        }
        other => panic!("expected MalformedPanel, got {:?}", other.map(|w| w.records().len())),
    }
}

#[test]
/// Every window covers consecutive months and its label sits exactly
/// `horizon` months after the row following its last input.
fn windows_cover_consecutive_months() {
    let n = 48;
    let (lookback, horizon) = (6, 3);
    let windowed = prepare_windows(
        &wide_table(n, &three_entities(n)),
        &PreprocessorSettings::new(lookback, horizon),
    )
    .expect("windowing should succeed");

    let month_index = |d: NaiveDate| d.year() as i64 * 12 + d.month() as i64;
    for window in windowed.windows() {
        let rows = &windowed.records()[window.start..window.start + lookback];
        for pair in rows.windows(2) {
            assert_eq!(month_index(pair[1].record.date) - month_index(pair[0].record.date), 1);
        }
        let last = month_index(rows[lookback - 1].record.date);
        assert_eq!(month_index(window.label_date) - last, horizon as i64 + 1);
    }
}
