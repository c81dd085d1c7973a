pub mod batch;
pub mod bias;
pub mod config;
pub mod error;
pub mod forecast;
pub mod input;
pub mod model;
pub mod panel;
pub mod predictor;
pub mod store;

pub use error::{ForecastError, Result};
pub use forecast::{ForecastSettings, Forecaster};
pub use model::ForecastSeries;
pub use store::ResultStore;
