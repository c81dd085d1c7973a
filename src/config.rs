use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::forecast::ForecastSettings;
use crate::panel::{SplitRatios, DEFAULT_ID_COLUMN};
use crate::predictor::{default_horizon_table, HorizonTable};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub forecast: ForecastConfig,
    pub models: ModelsConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub bias: BiasConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub panel_path: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    pub lookback: usize,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default)]
    pub split: SplitRatios,
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default = "default_smoothing_order")]
    pub smoothing_order: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    /// Empty means the built-in 1/3/5-year table.
    #[serde(default)]
    pub horizons: Vec<HorizonEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HorizonEntry {
    pub horizon: u32,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiasConfig {
    Fixed {
        #[serde(default)]
        delta: f64,
    },
    Angle {
        path: PathBuf,
    },
}

impl Default for BiasConfig {
    fn default() -> Self {
        BiasConfig::Fixed { delta: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchConfig {
    /// Requests forecast at the same time; each holds its own prepared panels.
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_batch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

fn default_history_len() -> usize {
    12
}

fn default_smoothing_window() -> usize {
    5
}

fn default_smoothing_order() -> usize {
    2
}

fn default_batch_concurrency() -> usize {
    4
}

impl Config {
    /// Loads `.env`, then the file named by `VALUATION_CONFIG` (or
    /// `config/default.toml`).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("VALUATION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        if let Ok(panel_path) = std::env::var("VALUATION_PANEL_PATH") {
            if !panel_path.trim().is_empty() {
                config.data.panel_path = PathBuf::from(panel_path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast.lookback == 0 {
            bail!("forecast.lookback must be > 0");
        }
        if self.forecast.smoothing_window < 3 || self.forecast.smoothing_window % 2 == 0 {
            bail!(
                "forecast.smoothing_window must be odd and >= 3, got {}",
                self.forecast.smoothing_window
            );
        }
        if self.forecast.smoothing_order >= self.forecast.smoothing_window {
            bail!("forecast.smoothing_order must be below smoothing_window");
        }
        if self.batch.concurrency == 0 {
            bail!("batch.concurrency must be > 0");
        }
        self.forecast
            .split
            .validate()
            .context("forecast.split is invalid")?;
        self.horizon_table()
            .context("models.horizons is invalid")?;
        Ok(())
    }

    pub fn horizon_table(&self) -> Result<HorizonTable> {
        if self.models.horizons.is_empty() {
            return Ok(default_horizon_table());
        }
        let table = HorizonTable::new(
            self.models
                .horizons
                .iter()
                .map(|entry| (entry.horizon, entry.model.clone())),
        )?;
        Ok(table)
    }

    pub fn forecast_settings(&self) -> ForecastSettings {
        ForecastSettings {
            panel_path: self.data.panel_path.clone(),
            id_column: self.data.id_column.clone(),
            lookback: self.forecast.lookback,
            history_len: self.forecast.history_len,
            split: self.forecast.split,
            smoothing_window: self.forecast.smoothing_window,
            smoothing_order: self.forecast.smoothing_order,
        }
    }
}
