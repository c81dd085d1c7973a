use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Horizon offset → price for one entity.
///
/// Negative offsets are past actuals, `0` is the current valuation and
/// positive offsets are months-ahead forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub entity_id: String,
    pub points: BTreeMap<i32, f64>,
}

impl ForecastSeries {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            points: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, horizon: i32, price: f64) {
        self.points.insert(horizon, price);
    }

    pub fn get(&self, horizon: i32) -> Option<f64> {
        self.points.get(&horizon).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.points.iter().map(|(h, p)| (*h, *p))
    }

    pub fn history(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.points.range(..0).map(|(h, p)| (*h, *p))
    }

    pub fn forecasts(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.points.range(1..).map(|(h, p)| (*h, *p))
    }
}
