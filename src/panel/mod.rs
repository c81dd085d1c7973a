//! Panel preprocessing: wide per-entity table → causal feature windows,
//! chronological splits and train-fitted scalers.
//!
//! [`prepare_windows`] builds a [`WindowedPanel`] (features, windows and
//! splits) and [`WindowedPanel::fit`] turns it into a [`PreparedPanel`], the
//! immutable context every downstream step borrows. `PanelPreprocessor::run`
//! and [`prepare`] do both. Nothing is cached between runs; each horizon gets
//! its own.

pub mod features;
pub mod long;
pub mod scaler;
pub mod wide;
pub mod window;

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{ForecastError, Result};

pub use features::{derive_features, FeatureRow, FEATURE_NAMES, FEATURE_WARMUP, NUM_FEATURES};
pub use long::{entity_order, EntityLookup, LongPanel, LongRecord};
pub use scaler::MinMaxScaler;
pub use wide::{WidePanel, WideRow, DEFAULT_ID_COLUMN};
pub use window::{build_split, entity_windows, Partition, SplitRatios, SplitSet, Window};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessorSettings {
    pub lookback: usize,
    pub horizon: usize,
    /// Added to every value before features are derived.
    pub delta: Option<f64>,
    pub split: SplitRatios,
}

impl PreprocessorSettings {
    pub fn new(lookback: usize, horizon: usize) -> Self {
        Self {
            lookback,
            horizon,
            delta: None,
            split: SplitRatios::default(),
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_split(mut self, split: SplitRatios) -> Self {
        self.split = split;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 {
            return Err(ForecastError::InvalidSettings(
                "lookback must be > 0".to_string(),
            ));
        }
        if let Some(delta) = self.delta {
            if !delta.is_finite() {
                return Err(ForecastError::InvalidSettings(format!(
                    "delta must be finite, got {}",
                    delta
                )));
            }
        }
        self.split.validate()
    }

    /// Feature rows an entity needs to contribute at least one window.
    pub fn min_entity_rows(&self) -> usize {
        self.lookback + self.horizon + 1
    }
}

/// Reads the wide table named by its configured path on every run.
#[derive(Debug, Clone)]
pub struct PanelPreprocessor {
    panel_path: PathBuf,
    id_column: String,
    settings: PreprocessorSettings,
}

impl PanelPreprocessor {
    pub fn new(panel_path: impl Into<PathBuf>, settings: PreprocessorSettings) -> Self {
        Self {
            panel_path: panel_path.into(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            settings,
        }
    }

    pub fn with_id_column(mut self, id_column: impl Into<String>) -> Self {
        self.id_column = id_column.into();
        self
    }

    pub fn settings(&self) -> &PreprocessorSettings {
        &self.settings
    }

    pub fn run(&self) -> Result<PreparedPanel> {
        let wide = WidePanel::from_path(&self.panel_path, &self.id_column)?;
        prepare(&wide, &self.settings)
    }
}

/// One long-panel record with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub record: LongRecord,
    pub features: FeatureRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntitySpan {
    start: usize,
    len: usize,
}

/// Model input: scaled feature rows plus the unscaled entity code.
#[derive(Debug, Clone, Copy)]
pub struct EncodedWindow<'a> {
    pub entity_code: u32,
    pub inputs: &'a [FeatureRow],
}

/// A window from one partition with its scaled inputs and label.
#[derive(Debug, Clone, Copy)]
pub struct ScaledWindow<'a> {
    pub window: &'a Window,
    pub inputs: &'a [FeatureRow],
    pub label: f64,
}

impl<'a> ScaledWindow<'a> {
    pub fn encoded(&self) -> EncodedWindow<'a> {
        EncodedWindow {
            entity_code: self.window.entity_code,
            inputs: self.inputs,
        }
    }
}

/// Features, windows and splits for one horizon, before any scaling.
#[derive(Debug, Clone)]
pub struct WindowedPanel {
    settings: PreprocessorSettings,
    lookup: EntityLookup,
    records: Vec<FeatureRecord>,
    spans: Vec<EntitySpan>,
    windows: Vec<Window>,
    splits: SplitSet,
}

/// A [`WindowedPanel`] with scalers fit on its training partition.
#[derive(Debug, Clone)]
pub struct PreparedPanel {
    windowed: WindowedPanel,
    scaled: Vec<FeatureRow>,
    feature_scaler: MinMaxScaler,
    label_scaler: MinMaxScaler,
}

/// Runs the whole preprocessing pipeline over an already loaded table.
pub fn prepare(wide: &WidePanel, settings: &PreprocessorSettings) -> Result<PreparedPanel> {
    prepare_windows(wide, settings)?.fit()
}

/// Completeness filter, melt, delta, causal features, windows and split.
pub fn prepare_windows(wide: &WidePanel, settings: &PreprocessorSettings) -> Result<WindowedPanel> {
    settings.validate()?;

    let mut long = LongPanel::melt(wide)?;
    if let Some(delta) = settings.delta {
        long.shift_values(delta);
    }
    let (long_records, lookup) = long.into_parts();

    let mut records = Vec::with_capacity(long_records.len());
    let mut spans = Vec::with_capacity(lookup.len());
    let mut per_entity = Vec::with_capacity(lookup.len());
    for entity in long_records.chunk_by(|a, b| a.entity_code == b.entity_code) {
        let values: Vec<f64> = entity.iter().map(|r| r.value).collect();
        let dates: Vec<NaiveDate> = entity.iter().map(|r| r.date).collect();

        let start = records.len();
        let derived = derive_features(&values, &dates);
        for (record, features) in entity.iter().zip(derived).skip(FEATURE_WARMUP) {
            // a dropped row here would splice non-consecutive months into one window
            let features = features.ok_or_else(|| {
                ForecastError::MalformedPanel(format!(
                    "entity {} has a non-finite feature at {}",
                    record.entity_id, record.date
                ))
            })?;
            records.push(FeatureRecord {
                record: record.clone(),
                features,
            });
        }
        let span = EntitySpan {
            start,
            len: records.len() - start,
        };
        spans.push(span);

        let kept = &records[span.start..span.start + span.len];
        let kept_values: Vec<f64> = kept.iter().map(|r| r.record.value).collect();
        let kept_dates: Vec<NaiveDate> = kept.iter().map(|r| r.record.date).collect();
        per_entity.push(entity_windows(
            entity[0].entity_code,
            span.start,
            &kept_values,
            &kept_dates,
            settings.lookback,
            settings.horizon,
        ));
    }
    tracing::info!(
        entities = lookup.len(),
        rows = records.len(),
        features = ?FEATURE_NAMES,
        "derived causal features"
    );

    let (windows, splits) = build_split(per_entity, &settings.split);
    tracing::info!(
        horizon = settings.horizon,
        lookback = settings.lookback,
        windows = windows.len(),
        "built windows"
    );

    Ok(WindowedPanel {
        settings: *settings,
        lookup,
        records,
        spans,
        windows,
        splits,
    })
}

impl WindowedPanel {
    pub fn settings(&self) -> &PreprocessorSettings {
        &self.settings
    }

    pub fn lookup(&self) -> &EntityLookup {
        &self.lookup
    }

    /// Delta-adjusted long panel with features, sorted by `(entity, date)`.
    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn splits(&self) -> &SplitSet {
        &self.splits
    }

    fn span(&self, entity_id: &str) -> Result<(u32, EntitySpan)> {
        let code = self
            .lookup
            .code(entity_id)
            .ok_or_else(|| ForecastError::UnknownEntity(entity_id.to_string()))?;
        Ok((code, self.spans[code as usize]))
    }

    pub fn entity_records(&self, entity_id: &str) -> Result<&[FeatureRecord]> {
        let (_, span) = self.span(entity_id)?;
        Ok(&self.records[span.start..span.start + span.len])
    }

    pub fn entity_windows(&self, entity_id: &str) -> Result<impl Iterator<Item = &Window> + '_> {
        let (code, _) = self.span(entity_id)?;
        Ok(self.windows.iter().filter(move |w| w.entity_code == code))
    }

    /// Fails with `InsufficientHistory` unless `entity_id` has enough feature
    /// rows to contribute a window at this horizon.
    pub fn require_history(&self, entity_id: &str) -> Result<()> {
        self.history_span(entity_id).map(|_| ())
    }

    fn history_span(&self, entity_id: &str) -> Result<(u32, EntitySpan)> {
        let (code, span) = self.span(entity_id)?;
        let required = self.settings.min_entity_rows();
        if span.len < required {
            return Err(ForecastError::InsufficientHistory {
                entity: entity_id.to_string(),
                required,
                available: span.len,
            });
        }
        Ok((code, span))
    }

    /// Last `n` delta-adjusted values of `entity_id`, oldest first.
    pub fn recent_values(&self, entity_id: &str, n: usize) -> Result<Vec<f64>> {
        let rows = self.entity_records(entity_id)?;
        let skip = rows.len().saturating_sub(n);
        Ok(rows[skip..].iter().map(|r| r.record.value).collect())
    }

    /// Fits both scalers on the training partition only and scales every row.
    pub fn fit(self) -> Result<PreparedPanel> {
        let lookback = self.settings.lookback;
        let empty = || ForecastError::EmptyTrainingSet {
            horizon: self.settings.horizon,
        };
        let feature_scaler = MinMaxScaler::fit(
            NUM_FEATURES,
            self.splits.train.iter().flat_map(|&w| {
                let start = self.windows[w].start;
                self.records[start..start + lookback]
                    .iter()
                    .map(|r| r.features.as_slice())
            }),
        )
        .ok_or_else(empty)?;
        let label_scaler = MinMaxScaler::fit(
            1,
            self.splits
                .train
                .iter()
                .map(|&w| std::slice::from_ref(&self.windows[w].label)),
        )
        .ok_or_else(empty)?;

        let scaled = self
            .records
            .iter()
            .map(|r| {
                let mut row = r.features;
                feature_scaler.transform_in_place(&mut row);
                row
            })
            .collect();

        for partition in Partition::ALL {
            tracing::info!(
                horizon = self.settings.horizon,
                partition = partition.label(),
                windows = self.splits.indices(partition).len(),
                "split ready"
            );
        }

        Ok(PreparedPanel {
            windowed: self,
            scaled,
            feature_scaler,
            label_scaler,
        })
    }
}

impl PreparedPanel {
    pub fn windowed(&self) -> &WindowedPanel {
        &self.windowed
    }

    pub fn settings(&self) -> &PreprocessorSettings {
        self.windowed.settings()
    }

    pub fn lookup(&self) -> &EntityLookup {
        self.windowed.lookup()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        self.windowed.records()
    }

    pub fn windows(&self) -> &[Window] {
        self.windowed.windows()
    }

    pub fn splits(&self) -> &SplitSet {
        self.windowed.splits()
    }

    pub fn feature_scaler(&self) -> &MinMaxScaler {
        &self.feature_scaler
    }

    pub fn label_scaler(&self) -> &MinMaxScaler {
        &self.label_scaler
    }

    pub fn recent_values(&self, entity_id: &str, n: usize) -> Result<Vec<f64>> {
        self.windowed.recent_values(entity_id, n)
    }

    pub fn window_inputs(&self, window: &Window) -> &[FeatureRow] {
        &self.scaled[window.start..window.start + self.settings().lookback]
    }

    pub fn scaled_label(&self, window: &Window) -> f64 {
        self.label_scaler.transform_value(0, window.label)
    }

    /// Maps a model output in label-scaled units back to a price.
    pub fn inverse_label(&self, scaled: f64) -> f64 {
        self.label_scaler.inverse_value(0, scaled)
    }

    pub fn partition(&self, partition: Partition) -> impl Iterator<Item = ScaledWindow<'_>> + '_ {
        self.splits().indices(partition).iter().map(move |&i| {
            let window = &self.windows()[i];
            ScaledWindow {
                window,
                inputs: self.window_inputs(window),
                label: self.scaled_label(window),
            }
        })
    }

    /// The most recent `lookback` rows of `entity_id`, scaled for inference.
    pub fn latest_window(&self, entity_id: &str) -> Result<EncodedWindow<'_>> {
        let (code, span) = self.windowed.history_span(entity_id)?;
        let end = span.start + span.len;
        Ok(EncodedWindow {
            entity_code: code,
            inputs: &self.scaled[end - self.settings().lookback..end],
        })
    }
}
