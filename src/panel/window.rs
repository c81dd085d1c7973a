use std::ops::Range;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{ForecastError, Result};

/// A lookback slice of one entity's feature rows and its shifted label.
///
/// `start` indexes the prepared panel's feature rows; the window covers
/// `start..start + lookback`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub entity_code: u32,
    pub start: usize,
    pub label: f64,
    pub label_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Train,
    Validation,
    Test,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Train, Partition::Validation, Partition::Test];

    pub fn label(self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Validation => "validation",
            Partition::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> Result<()> {
        let ok = self.train > 0.0
            && self.validation >= 0.0
            && self.train + self.validation < 1.0
            && self.train.is_finite()
            && self.validation.is_finite();
        if ok {
            Ok(())
        } else {
            Err(ForecastError::InvalidSettings(format!(
                "split ratios train={} validation={} must be positive and sum below 1",
                self.train, self.validation
            )))
        }
    }

    /// `(train, validation)` window counts for an entity with `n` windows;
    /// the test partition takes the remainder.
    pub fn counts(&self, n: usize) -> (usize, usize) {
        let n_train = (n as f64 * self.train).floor() as usize;
        let n_validation = (n as f64 * self.validation).floor() as usize;
        (n_train, n_validation.min(n - n_train))
    }
}

/// Indices into the prepared panel's windows, one list per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitSet {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitSet {
    pub fn indices(&self, partition: Partition) -> &[usize] {
        match partition {
            Partition::Train => &self.train,
            Partition::Validation => &self.validation,
            Partition::Test => &self.test,
        }
    }

    /// Splits one entity's contiguous, chronologically ordered windows.
    fn push_entity(&mut self, windows: Range<usize>, ratios: &SplitRatios) {
        let (n_train, n_validation) = ratios.counts(windows.len());
        let train_end = windows.start + n_train;
        let validation_end = train_end + n_validation;
        self.train.extend(windows.start..train_end);
        self.validation.extend(train_end..validation_end);
        self.test.extend(validation_end..windows.end);
    }
}

/// Emits every window of one entity whose rows sit at `offset..offset + dates.len()`
/// in the panel. Produces nothing when the entity has fewer than
/// `lookback + horizon + 1` rows.
pub fn entity_windows(
    entity_code: u32,
    offset: usize,
    values: &[f64],
    dates: &[NaiveDate],
    lookback: usize,
    horizon: usize,
) -> Vec<Window> {
    let n = values.len();
    if n < lookback + horizon + 1 {
        return Vec::new();
    }
    (lookback..n - horizon)
        .map(|i| Window {
            entity_code,
            start: offset + i - lookback,
            label: values[i + horizon],
            label_date: dates[i + horizon],
        })
        .collect()
}

/// Windows grouped per entity, in entity order, with their chronological split.
pub fn build_split(
    per_entity: impl IntoIterator<Item = Vec<Window>>,
    ratios: &SplitRatios,
) -> (Vec<Window>, SplitSet) {
    let mut windows = Vec::new();
    let mut split = SplitSet::default();
    for entity in per_entity {
        let start = windows.len();
        windows.extend(entity);
        split.push_entity(start..windows.len(), ratios);
    }
    (windows, split)
}
