//! Forecasts many requests against one loaded panel with bounded fan-out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::{ForecastError, Result as ForecastResult};
use crate::forecast::Forecaster;
use crate::input::ForecastRequest;
use crate::panel::WidePanel;
use crate::predictor::ModelLoader;
use crate::store::ResultStore;

#[derive(Debug, Default)]
pub struct BatchReport {
    pub stored: Vec<i64>,
    pub failed: Vec<(i64, ForecastError)>,
    pub panicked: usize,
}

impl BatchReport {
    pub fn failures(&self) -> usize {
        self.failed.len() + self.panicked
    }

    fn record(&mut self, joined: std::result::Result<(i64, ForecastResult<usize>), JoinError>) {
        match joined {
            Ok((uid, Ok(points))) => {
                tracing::info!(uid, points, "batch request stored");
                self.stored.push(uid);
            }
            Ok((uid, Err(e))) => {
                tracing::error!(uid, error = %e, "batch request failed");
                self.failed.push((uid, e));
            }
            Err(e) => {
                tracing::error!(error = %e, "batch task panicked");
                self.panicked += 1;
            }
        }
    }
}

/// Runs every request on the blocking pool, at most `concurrency` at a time.
///
/// All tasks share `wide` and the forecaster's model cache; each builds and
/// drops its own prepared panels. A failed request is reported and does not
/// stop the others.
pub async fn run_batch<L: ModelLoader + 'static>(
    forecaster: Arc<Forecaster<L>>,
    store: ResultStore,
    wide: Arc<WidePanel>,
    requests: Vec<ForecastRequest>,
    concurrency: usize,
) -> Result<BatchReport> {
    let limiter = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut report = BatchReport::default();

    tracing::info!(requests = requests.len(), concurrency, "batch started");
    for request in requests {
        let permit = Arc::clone(&limiter)
            .acquire_owned()
            .await
            .context("batch limiter closed")?;
        let forecaster = Arc::clone(&forecaster);
        let store = store.clone();
        let wide = Arc::clone(&wide);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = forecaster
                .forecast_panel(
                    &wide,
                    request.uid,
                    &request.entity_id,
                    request.reference_price,
                    request.quality_score,
                )
                .and_then(|series| store.put(request.uid, &series).map(|_| series.len()));
            (request.uid, outcome)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        report.record(joined);
    }

    tracing::info!(
        stored = report.stored.len(),
        failed = report.failures(),
        "batch finished"
    );
    Ok(report)
}
