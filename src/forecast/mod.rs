//! Multi-horizon forecast orchestration for one entity per request.

pub mod smoothing;

use std::path::PathBuf;
use std::sync::Arc;

use crate::bias::BiasCorrector;
use crate::error::{ForecastError, Result};
use crate::model::ForecastSeries;
use crate::panel::{
    prepare_windows, PreprocessorSettings, SplitRatios, WidePanel, DEFAULT_ID_COLUMN,
};
use crate::predictor::{HorizonTable, ModelCache, ModelLoader};
use crate::store::ResultStore;

pub use smoothing::savgol_filter;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub panel_path: PathBuf,
    pub id_column: String,
    pub lookback: usize,
    /// Number of delta-adjusted actuals stitched in at `-history_len..=-1`.
    pub history_len: usize,
    pub split: SplitRatios,
    pub smoothing_window: usize,
    pub smoothing_order: usize,
}

impl ForecastSettings {
    pub fn new(panel_path: impl Into<PathBuf>, lookback: usize) -> Self {
        Self {
            panel_path: panel_path.into(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            lookback,
            history_len: 12,
            split: SplitRatios::default(),
            smoothing_window: 5,
            smoothing_order: 2,
        }
    }
}

pub struct Forecaster<L> {
    settings: ForecastSettings,
    horizons: HorizonTable,
    models: ModelCache<L>,
    bias: Arc<dyn BiasCorrector>,
}

impl<L: ModelLoader> Forecaster<L> {
    pub fn new(
        settings: ForecastSettings,
        horizons: HorizonTable,
        loader: L,
        bias: Arc<dyn BiasCorrector>,
    ) -> Self {
        Self {
            settings,
            horizons,
            models: ModelCache::new(loader),
            bias,
        }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    pub fn horizons(&self) -> &HorizonTable {
        &self.horizons
    }

    pub fn models(&self) -> &ModelCache<L> {
        &self.models
    }

    /// Reads the configured panel and forecasts `entity_id`.
    pub fn forecast(
        &self,
        identity: i64,
        entity_id: &str,
        reference_price: f64,
        quality_score: f64,
    ) -> Result<ForecastSeries> {
        let wide = WidePanel::from_path(&self.settings.panel_path, &self.settings.id_column)?;
        self.forecast_panel(&wide, identity, entity_id, reference_price, quality_score)
    }

    /// Forecasts against an already loaded table. Every horizon gets its own
    /// preprocessing run; a failure at any horizon fails the whole request.
    pub fn forecast_panel(
        &self,
        wide: &WidePanel,
        identity: i64,
        entity_id: &str,
        reference_price: f64,
        quality_score: f64,
    ) -> Result<ForecastSeries> {
        let latest = wide.latest_actual(entity_id)?;
        let price_gap = latest - reference_price;
        let delta = self.bias.predict(quality_score, price_gap)?;
        tracing::info!(
            uid = identity,
            entity = entity_id,
            latest,
            reference_price,
            price_gap,
            delta,
            "bias correction resolved"
        );

        let mut series = ForecastSeries::new(entity_id);
        let mut raw: Vec<(u32, f64)> = Vec::with_capacity(self.horizons.len());
        for horizon in self.horizons.horizons() {
            let model_id = self.horizons.model_for(horizon)?;
            let settings = PreprocessorSettings::new(self.settings.lookback, horizon as usize)
                .with_delta(delta)
                .with_split(self.settings.split);
            let windowed = prepare_windows(wide, &settings)?;
            windowed.require_history(entity_id)?;

            if raw.is_empty() {
                let history = windowed.recent_values(entity_id, self.settings.history_len)?;
                let len = history.len() as i32;
                for (k, value) in history.into_iter().enumerate() {
                    series.insert(k as i32 - len, value);
                }
            }

            let prepared = windowed.fit()?;
            let window = prepared.latest_window(entity_id)?;
            let model = self.models.get(model_id)?;
            let scaled = model.predict(&window)?;
            let price = prepared.inverse_label(scaled);
            if !price.is_finite() {
                return Err(ForecastError::Inference {
                    model: model_id.to_string(),
                    reason: format!("non-finite price at horizon {}", horizon),
                });
            }
            tracing::debug!(uid = identity, horizon, model = model_id, price, "raw forecast");
            raw.push((horizon, price));
        }

        let prices: Vec<f64> = raw.iter().map(|(_, price)| *price).collect();
        let smoothed = savgol_filter(
            &prices,
            self.settings.smoothing_window,
            self.settings.smoothing_order,
        );
        for ((horizon, _), price) in raw.iter().zip(smoothed) {
            series.insert(*horizon as i32, price);
        }
        // current valuation is left unadjusted
        series.insert(0, latest);

        tracing::info!(
            uid = identity,
            entity = entity_id,
            points = series.len(),
            "forecast complete"
        );
        Ok(series)
    }

    pub fn forecast_and_store(
        &self,
        store: &ResultStore,
        identity: i64,
        entity_id: &str,
        reference_price: f64,
        quality_score: f64,
    ) -> Result<ForecastSeries> {
        let series = self.forecast(identity, entity_id, reference_price, quality_score)?;
        store.put(identity, &series)?;
        Ok(series)
    }

    /// Returns the stored series for `identity`, computing and storing it
    /// only when nothing is stored yet.
    pub fn cached_or_forecast(
        &self,
        store: &ResultStore,
        identity: i64,
        entity_id: &str,
        reference_price: f64,
        quality_score: f64,
    ) -> Result<ForecastSeries> {
        match store.get(identity) {
            Ok(series) => {
                tracing::debug!(uid = identity, "serving stored forecast");
                Ok(series)
            }
            Err(ForecastError::NotFound(_)) => {
                self.forecast_and_store(store, identity, entity_id, reference_price, quality_score)
            }
            Err(e) => Err(e),
        }
    }
}
