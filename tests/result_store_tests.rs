use std::sync::Arc;
use std::thread;

use valuation_forecast::{ForecastError, ForecastSeries, ResultStore};

fn series(entity: &str, base: f64, horizons: &[i32]) -> ForecastSeries {
    let mut s = ForecastSeries::new(entity);
    for (i, h) in horizons.iter().enumerate() {
        s.insert(*h, base + i as f64 * 1_000.0);
    }
    s
}

#[test]
/// Verifies results come back ordered by horizon, history first.
fn stored_series_is_sorted_by_horizon() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ResultStore::open(dir.path().join("results.sqlite")).expect("store should open");
    let s = series("8701", 400_000.0, &[60, -3, 0, 12, -1, 24]);
    store.put(42, &s).expect("put should succeed");

    let loaded = store.get(42).expect("get should succeed");
    let keys: Vec<i32> = loaded.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![-3, -1, 0, 12, 24, 60]);
    assert_eq!(loaded, s);
}

#[test]
/// Verifies a second put fully replaces the first, including horizons the new
/// series no longer carries.
fn put_replaces_previous_series() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ResultStore::open(dir.path().join("results.sqlite")).expect("store should open");
    let a = series("8701", 400_000.0, &[-1, 0, 10, 12, 65]);
    let b = series("8701", 410_000.0, &[-1, 0, 10, 12]);

    store.put(7, &a).expect("put should succeed");
    store.put(7, &b).expect("put should succeed");
    assert_eq!(store.get(7).expect("get should succeed"), b);
    assert_eq!(store.get(7).expect("get should succeed").get(65), None);
}

#[test]
fn missing_uid_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ResultStore::open(dir.path().join("results.sqlite")).expect("store should open");
    store.put(1, &series("8701", 1.0, &[0])).expect("put should succeed");
    assert!(matches!(store.get(2), Err(ForecastError::NotFound(2))));
}

#[test]
/// Verifies reopening an existing database keeps earlier results.
fn results_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("nested").join("results.sqlite");
    let s = series("94110", 900_000.0, &[-2, -1, 0, 10]);
    ResultStore::open(&path).expect("store should open").put(3, &s).expect("put should succeed");

    let reopened = ResultStore::open(&path).expect("store should open");
    assert_eq!(reopened.get(3).expect("get should succeed"), s);
}

#[test]
/// Readers racing a writer only ever observe one complete series, never a mix
/// of two puts.
fn concurrent_readers_see_whole_series() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ResultStore::open(dir.path().join("results.sqlite")).expect("store should open");
    let horizons: Vec<i32> = (-12..=65).collect();
    let a = Arc::new(series("10001", 100_000.0, &horizons));
    let b = Arc::new(series("10001", 900_000.0, &horizons[..40]));
    store.put(5, &a).expect("put should succeed");

    let writer = {
        let store = store.clone();
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || {
            for i in 0..40 {
                let next = if i % 2 == 0 { &b } else { &a };
                store.put(5, next).expect("put should succeed");
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                for _ in 0..40 {
                    let seen = store.get(5).expect("get should succeed");
                    assert!(seen == *a || seen == *b, "observed a torn series");
                }
            })
        })
        .collect();

    writer.join().expect("thread should not panic");
    for reader in readers {
        reader.join().expect("thread should not panic");
    }
}

#[test]
fn export_writes_one_row_per_point() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ResultStore::open(dir.path().join("results.sqlite")).expect("store should open");
    store.put(2, &series("94110", 900_000.0, &[0, 12])).expect("put should succeed");
    store.put(1, &series("8701", 400_000.0, &[-1, 0, 10])).expect("put should succeed");

    let out = dir.path().join("export.csv");
    let rows = store.export_csv(&out).expect("export should succeed");
    assert_eq!(rows, 5);

    let mut reader = csv::Reader::from_path(&out).expect("export should be readable");
    assert_eq!(
        reader.headers().expect("headers should parse").iter().collect::<Vec<_>>(),
        vec!["uid", "zip_code", "horizon", "predicted_price"]
    );
    let records: Vec<csv::StringRecord> = reader
        .records()
        .map(|r| r.expect("export row should parse"))
        .collect();
    assert_eq!(&records[0][0], "1");
    assert_eq!(&records[0][2], "-1");
    assert_eq!(&records[3][1], "94110");
    let price: f64 = records[4][3].parse().expect("price should parse");
    assert!((price - 901_000.0).abs() < f64::EPSILON);
}
