use std::sync::Arc;

use anyhow::{Context, Result};

use valuation_forecast::batch::run_batch;
use valuation_forecast::bias;
use valuation_forecast::config::Config;
use valuation_forecast::forecast::Forecaster;
use valuation_forecast::input::{
    load_batch_requests, parse_cli_command, CliCommand, ForecastRequest,
};
use valuation_forecast::model::ForecastSeries;
use valuation_forecast::panel::WidePanel;
use valuation_forecast::predictor::JsonModelLoader;
use valuation_forecast::store::ResultStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_cli_command(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set VALUATION_CONFIG or create config/default.toml");
            std::process::exit(1);
        }
    };

    // stdout carries results, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .json()
        .init();

    tracing::info!(
        panel = %config.data.panel_path.display(),
        lookback = config.forecast.lookback,
        store = %config.store.path.display(),
        "valuation-forecast starting"
    );

    let store = ResultStore::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))?;

    match command {
        CliCommand::Forecast(request) => {
            let forecaster = build_forecaster(&config)?;
            let series = run_request(&forecaster, &store, &request)?;
            print_series(request.uid, &series)?;
        }
        CliCommand::Show { uid } => {
            let series = store
                .get(uid)
                .with_context(|| format!("failed to load forecast for uid {}", uid))?;
            print_series(uid, &series)?;
        }
        CliCommand::Batch { requests } => {
            let requests = load_batch_requests(&requests)?;
            let forecaster = Arc::new(build_forecaster(&config)?);
            let wide = WidePanel::from_path(&config.data.panel_path, &config.data.id_column)
                .with_context(|| {
                    format!("failed to load panel {}", config.data.panel_path.display())
                })?;
            let report = run_batch(
                forecaster,
                store,
                Arc::new(wide),
                requests,
                config.batch.concurrency,
            )
            .await?;
            if report.failures() > 0 {
                anyhow::bail!("{} batch request(s) failed", report.failures());
            }
        }
        CliCommand::Export { out } => {
            let rows = store
                .export_csv(&out)
                .with_context(|| format!("failed to export to {}", out.display()))?;
            tracing::info!(rows, out = %out.display(), "exported stored forecasts");
        }
    }

    Ok(())
}

fn build_forecaster(config: &Config) -> Result<Forecaster<JsonModelLoader>> {
    let horizons = config.horizon_table()?;
    let bias = bias::from_config(&config.bias).context("failed to build bias corrector")?;
    Ok(Forecaster::new(
        config.forecast_settings(),
        horizons,
        JsonModelLoader::new(&config.models.dir),
        bias,
    ))
}

fn run_request(
    forecaster: &Forecaster<JsonModelLoader>,
    store: &ResultStore,
    request: &ForecastRequest,
) -> Result<ForecastSeries> {
    forecaster
        .forecast_and_store(
            store,
            request.uid,
            &request.entity_id,
            request.reference_price,
            request.quality_score,
        )
        .with_context(|| {
            format!(
                "forecast failed for uid {} entity {}",
                request.uid, request.entity_id
            )
        })
}

fn print_series(uid: i64, series: &ForecastSeries) -> Result<()> {
    let payload = serde_json::json!({
        "uid": uid,
        "entity_id": series.entity_id,
        "points": series.points,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
