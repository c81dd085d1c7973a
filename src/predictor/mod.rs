//! Opaque horizon models: the horizon → model table, loading, and a
//! load-once cache shared across requests.

pub mod cache;
pub mod horizons;
pub mod linear;

use std::sync::Arc;

use crate::error::Result;
use crate::panel::EncodedWindow;

pub use cache::ModelCache;
pub use horizons::{default_horizon_table, HorizonTable};
pub use linear::{JsonModelLoader, LinearWindowModel};

/// A loaded model. Output is in label-scaled units.
pub trait HorizonModel: Send + Sync {
    fn predict(&self, window: &EncodedWindow<'_>) -> Result<f64>;
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, model_id: &str) -> Result<Arc<dyn HorizonModel>>;
}
