use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ForecastError, Result};

/// Explicit horizon → model identifier mapping. Horizons iterate ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonTable {
    entries: BTreeMap<u32, String>,
}

impl HorizonTable {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (horizon, model) in entries {
            let model = model.into();
            if horizon == 0 {
                return Err(ForecastError::InvalidSettings(
                    "horizon 0 is the current valuation, not a forecast".to_string(),
                ));
            }
            if model.trim().is_empty() {
                return Err(ForecastError::InvalidSettings(format!(
                    "horizon {} has an empty model identifier",
                    horizon
                )));
            }
            if let Some(previous) = map.insert(horizon, model) {
                return Err(ForecastError::InvalidSettings(format!(
                    "horizon {} mapped twice (already {})",
                    horizon, previous
                )));
            }
        }
        if map.is_empty() {
            return Err(ForecastError::InvalidSettings(
                "horizon table is empty".to_string(),
            ));
        }
        Ok(Self { entries: map })
    }

    pub fn model_for(&self, horizon: u32) -> Result<&str> {
        self.entries
            .get(&horizon)
            .map(String::as_str)
            .ok_or(ForecastError::UnmappedHorizon(horizon))
    }

    pub fn horizons(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn model_ids(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn default_horizon_table() -> HorizonTable {
    let mut entries = Vec::new();
    entries.extend([10, 12, 14, 20, 24].map(|h| (h, "1-year")));
    entries.extend([30, 36, 42].map(|h| (h, "3-year")));
    entries.extend([45, 48, 55, 60, 65].map(|h| (h, "5-year")));
    HorizonTable {
        entries: entries
            .into_iter()
            .map(|(h, model)| (h, model.to_string()))
            .collect(),
    }
}
