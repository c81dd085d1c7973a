use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::predictor::{HorizonModel, ModelLoader};

/// Loads each model identifier once and hands out shared handles.
///
/// The lock is held across a load, so concurrent requests for the same
/// identifier wait for the first load instead of repeating it.
pub struct ModelCache<L> {
    loader: L,
    loaded: Mutex<HashMap<String, Arc<dyn HorizonModel>>>,
}

impl<L: ModelLoader> ModelCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, model_id: &str) -> Result<Arc<dyn HorizonModel>> {
        let mut loaded = self
            .loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = loaded.get(model_id) {
            return Ok(Arc::clone(model));
        }
        let model = self.loader.load(model_id)?;
        tracing::info!(model = model_id, "loaded horizon model");
        loaded.insert(model_id.to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}
