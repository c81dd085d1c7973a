use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::panel::{EncodedWindow, FeatureRow};
use crate::predictor::{HorizonModel, ModelLoader};

/// Linear readout over a scaled window, stored as JSON.
///
/// `prediction = intercept + Σ weights[t]·inputs[t] + entity_offsets[code]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWindowModel {
    #[serde(skip)]
    id: String,
    pub lookback: usize,
    pub weights: Vec<FeatureRow>,
    pub intercept: f64,
    #[serde(default)]
    pub entity_offsets: HashMap<u32, f64>,
}

impl LinearWindowModel {
    pub fn new(id: impl Into<String>, weights: Vec<FeatureRow>, intercept: f64) -> Self {
        Self {
            id: id.into(),
            lookback: weights.len(),
            weights,
            intercept,
            entity_offsets: HashMap::new(),
        }
    }

    pub fn with_entity_offset(mut self, entity_code: u32, offset: f64) -> Self {
        self.entity_offsets.insert(entity_code, offset);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_path(id: &str, path: &Path) -> Result<Self> {
        let load_err = |reason: String| ForecastError::ModelLoad {
            model: id.to_string(),
            reason,
        };
        let payload = std::fs::read_to_string(path)
            .map_err(|e| load_err(format!("{}: {}", path.display(), e)))?;
        let mut model: LinearWindowModel =
            serde_json::from_str(&payload).map_err(|e| load_err(e.to_string()))?;
        model.id = id.to_string();
        if model.lookback == 0 || model.weights.len() != model.lookback {
            return Err(load_err(format!(
                "expected {} weight rows, found {}",
                model.lookback,
                model.weights.len()
            )));
        }
        Ok(model)
    }
}

impl HorizonModel for LinearWindowModel {
    fn predict(&self, window: &EncodedWindow<'_>) -> Result<f64> {
        if window.inputs.len() != self.lookback {
            return Err(ForecastError::Inference {
                model: self.id.clone(),
                reason: format!(
                    "window has {} rows, model expects {}",
                    window.inputs.len(),
                    self.lookback
                ),
            });
        }
        let linear: f64 = self
            .weights
            .iter()
            .zip(window.inputs)
            .map(|(w, x)| w.iter().zip(x).map(|(a, b)| a * b).sum::<f64>())
            .sum();
        let offset = self
            .entity_offsets
            .get(&window.entity_code)
            .copied()
            .unwrap_or(0.0);
        let out = self.intercept + linear + offset;
        if !out.is_finite() {
            return Err(ForecastError::Inference {
                model: self.id.clone(),
                reason: "non-finite output".to_string(),
            });
        }
        Ok(out)
    }
}

/// Loads `<dir>/<model_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonModelLoader {
    dir: PathBuf,
}

impl JsonModelLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", model_id))
    }
}

impl ModelLoader for JsonModelLoader {
    fn load(&self, model_id: &str) -> Result<Arc<dyn HorizonModel>> {
        let path = self.model_path(model_id);
        let model = LinearWindowModel::from_path(model_id, &path)?;
        tracing::debug!(
            model = model.id(),
            lookback = model.lookback,
            path = %path.display(),
            "parsed linear window model"
        );
        Ok(Arc::new(model))
    }
}
