use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BiasConfig;
use crate::error::{ForecastError, Result};

/// Maps `(quality_score, price_gap)` to a dollar adjustment.
pub trait BiasCorrector: Send + Sync {
    fn predict(&self, score: f64, error: f64) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDelta(pub f64);

impl BiasCorrector for FixedDelta {
    fn predict(&self, _score: f64, _error: f64) -> Result<f64> {
        Ok(self.0)
    }
}

/// Readout over angle-encoded inputs, in the corrector's export format.
///
/// Each input is mapped from its fitted range onto `[-π, π]`; the head sees
/// the cosine of each angle and its output is multiplied by `scale` dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleBiasCorrector {
    pub score_min: f64,
    pub score_max: f64,
    pub error_min: f64,
    pub error_max: f64,
    pub weights: [f64; 2],
    pub intercept: f64,
    pub scale: f64,
}

impl AngleBiasCorrector {
    pub fn from_path(path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::BiasCorrection(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&payload).map_err(|e| {
            ForecastError::BiasCorrection(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

fn angle(value: f64, lo: f64, hi: f64) -> f64 {
    2.0 * PI * (value - lo) / (hi - lo + 1e-12) - PI
}

impl BiasCorrector for AngleBiasCorrector {
    fn predict(&self, score: f64, error: f64) -> Result<f64> {
        if !score.is_finite() || !error.is_finite() {
            return Err(ForecastError::BiasCorrection(format!(
                "non-finite input score={} error={}",
                score, error
            )));
        }
        let features = [
            angle(score, self.score_min, self.score_max).cos(),
            angle(error, self.error_min, self.error_max).cos(),
        ];
        let head = self.intercept
            + features
                .iter()
                .zip(self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        let delta = head * self.scale;
        if !delta.is_finite() {
            return Err(ForecastError::BiasCorrection(
                "non-finite delta".to_string(),
            ));
        }
        Ok(delta)
    }
}

pub fn from_config(cfg: &BiasConfig) -> Result<Arc<dyn BiasCorrector>> {
    match cfg {
        BiasConfig::Fixed { delta } => Ok(Arc::new(FixedDelta(*delta))),
        BiasConfig::Angle { path } => Ok(Arc::new(AngleBiasCorrector::from_path(path)?)),
    }
}
