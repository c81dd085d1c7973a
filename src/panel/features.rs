use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};

pub const NUM_FEATURES: usize = 8;

pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "lag_1",
    "lag_2",
    "lag_3",
    "lag_12",
    "rolling_mean_6",
    "pct_change_1",
    "sin_month",
    "cos_month",
];

/// Rows needed before the first record with every feature defined.
pub const FEATURE_WARMUP: usize = 12;

const ROLLING_WINDOW: usize = 6;

pub type FeatureRow = [f64; NUM_FEATURES];

/// Derives the feature row of every observation of one entity.
///
/// `values` and `dates` are the entity's chronologically ordered series. The
/// row at `i` reads only `values[..i]` and `dates[i]`, so no feature ever sees
/// the value it sits next to or anything after it. Rows without enough
/// history, or with a non-finite feature, come back as `None`.
pub fn derive_features(values: &[f64], dates: &[NaiveDate]) -> Vec<Option<FeatureRow>> {
    debug_assert_eq!(values.len(), dates.len());
    dates
        .iter()
        .enumerate()
        .map(|(i, date)| feature_row(&values[..i], *date))
        .collect()
}

fn feature_row(history: &[f64], date: NaiveDate) -> Option<FeatureRow> {
    let n = history.len();
    if n < FEATURE_WARMUP {
        return None;
    }
    let lag = |k: usize| history[n - k];

    let rolling_mean_6 = history[n - ROLLING_WINDOW..].iter().sum::<f64>() / ROLLING_WINDOW as f64;
    let pct_change_1 = (lag(1) - lag(2)) / lag(2);
    let angle = 2.0 * PI * f64::from(date.month()) / 12.0;

    let row = [
        lag(1),
        lag(2),
        lag(3),
        lag(12),
        rolling_mean_6,
        pct_change_1,
        angle.sin(),
        angle.cos(),
    ];
    row.iter().all(|v| v.is_finite()).then_some(row)
}
