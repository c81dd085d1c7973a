use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_QUALITY_SCORE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Forecast(ForecastRequest),
    Show { uid: i64 },
    Batch { requests: PathBuf },
    Export { out: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastRequest {
    pub uid: i64,
    #[serde(alias = "zip_code")]
    pub entity_id: String,
    #[serde(alias = "listing_price")]
    pub reference_price: f64,
    #[serde(default = "default_score", alias = "score")]
    pub quality_score: f64,
}

fn default_score() -> f64 {
    DEFAULT_QUALITY_SCORE
}

pub const USAGE: &str = "\
usage:
  valuation-forecast forecast <uid> <entity> <reference_price> [score]
  valuation-forecast show <uid>
  valuation-forecast batch <requests.csv>
  valuation-forecast export <out.csv>";

pub fn parse_cli_command(args: &[String]) -> Result<CliCommand> {
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n{}", USAGE);
    };
    match (command.to_ascii_lowercase().as_str(), rest) {
        ("forecast", [uid, entity, price]) => Ok(CliCommand::Forecast(ForecastRequest {
            uid: parse_uid(uid)?,
            entity_id: entity.trim().to_string(),
            reference_price: parse_number("reference_price", price)?,
            quality_score: DEFAULT_QUALITY_SCORE,
        })),
        ("forecast", [uid, entity, price, score]) => Ok(CliCommand::Forecast(ForecastRequest {
            uid: parse_uid(uid)?,
            entity_id: entity.trim().to_string(),
            reference_price: parse_number("reference_price", price)?,
            quality_score: parse_number("score", score)?,
        })),
        ("show", [uid]) => Ok(CliCommand::Show {
            uid: parse_uid(uid)?,
        }),
        ("batch", [path]) => Ok(CliCommand::Batch {
            requests: PathBuf::from(path),
        }),
        ("export", [path]) => Ok(CliCommand::Export {
            out: PathBuf::from(path),
        }),
        _ => bail!("unrecognised arguments {:?}\n{}", args, USAGE),
    }
}

fn parse_uid(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid uid '{}': expected an integer", raw))
}

fn parse_number(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid {} '{}': expected a number", name, raw))?;
    ensure_finite(name, value)
}

fn ensure_finite(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        bail!("invalid {} '{}': must be finite", name, value);
    }
    Ok(value)
}

/// Reads `uid,entity_id,reference_price[,quality_score]` rows. The legacy
/// `zip_code`, `listing_price` and `score` headers are accepted too.
pub fn load_batch_requests(path: &Path) -> Result<Vec<ForecastRequest>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut requests = Vec::new();
    for (line, row) in reader.deserialize::<ForecastRequest>().enumerate() {
        let invalid = || format!("{}: invalid request on line {}", path.display(), line + 2);
        let request = row.with_context(invalid)?;
        ensure_finite("reference_price", request.reference_price)
            .and_then(|_| ensure_finite("quality_score", request.quality_score))
            .with_context(invalid)?;
        requests.push(request);
    }
    Ok(requests)
}
