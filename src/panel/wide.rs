use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{ForecastError, Result};

pub const DEFAULT_ID_COLUMN: &str = "RegionName";

#[derive(Debug, Clone)]
pub struct WideRow {
    pub entity_id: String,
    /// Values of the non-dated columns, aligned with `WidePanel::metadata_columns`.
    pub metadata: Vec<String>,
    /// One value per dated column in chronological order; `None` marks a gap.
    pub values: Vec<Option<f64>>,
}

impl WideRow {
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// The raw per-entity table: one row per entity, one column per month.
#[derive(Debug, Clone)]
pub struct WidePanel {
    source_name: String,
    metadata_columns: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<WideRow>,
}

impl WidePanel {
    pub fn from_path(path: &Path, id_column: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(path)?;
        Self::from_csv(reader, id_column, path.display().to_string())
    }

    pub fn from_reader<R: Read>(reader: R, id_column: &str, source_name: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        Self::from_csv(reader, id_column, source_name.to_string())
    }

    fn from_csv<R: Read>(
        mut reader: csv::Reader<R>,
        id_column: &str,
        source_name: String,
    ) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let id_idx = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| {
                ForecastError::MalformedPanel(format!(
                    "{}: identifier column '{}' not found",
                    source_name, id_column
                ))
            })?;

        let mut dated: Vec<(usize, NaiveDate)> = Vec::new();
        let mut metadata_idx: Vec<usize> = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == id_idx {
                continue;
            }
            match NaiveDate::parse_from_str(header, "%Y-%m-%d") {
                Ok(date) => dated.push((idx, date)),
                Err(_) => metadata_idx.push(idx),
            }
        }
        if dated.is_empty() {
            return Err(ForecastError::MalformedPanel(format!(
                "{}: no dated columns",
                source_name
            )));
        }
        dated.sort_by_key(|(_, date)| *date);
        if dated.windows(2).any(|pair| pair[0].1 == pair[1].1) {
            return Err(ForecastError::MalformedPanel(format!(
                "{}: duplicated dated column",
                source_name
            )));
        }

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line_no = line + 2;
            let entity_id = record.get(id_idx).unwrap_or("").trim().to_string();
            if entity_id.is_empty() {
                return Err(ForecastError::MalformedPanel(format!(
                    "{}: line {} has an empty identifier",
                    source_name, line_no
                )));
            }
            if !seen.insert(entity_id.clone()) {
                return Err(ForecastError::MalformedPanel(format!(
                    "{}: entity {} appears more than once",
                    source_name, entity_id
                )));
            }

            let values = dated
                .iter()
                .map(|(idx, date)| {
                    parse_cell(record.get(*idx).unwrap_or("")).ok_or_else(|| {
                        ForecastError::MalformedPanel(format!(
                            "{}: line {} has a non-numeric value for {}",
                            source_name, line_no, date
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let metadata = metadata_idx
                .iter()
                .map(|idx| record.get(*idx).unwrap_or("").trim().to_string())
                .collect();

            rows.push(WideRow {
                entity_id,
                metadata,
                values,
            });
        }

        Ok(Self {
            source_name,
            metadata_columns: metadata_idx
                .iter()
                .map(|idx| headers[*idx].to_string())
                .collect(),
            dates: dated.into_iter().map(|(_, date)| date).collect(),
            rows,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn metadata_columns(&self) -> &[String] {
        &self.metadata_columns
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    pub fn row(&self, entity_id: &str) -> Option<&WideRow> {
        self.rows.iter().find(|row| row.entity_id == entity_id)
    }

    /// Rows with a value in every dated column. Gaps are never interpolated.
    pub fn complete_rows(&self) -> Result<Vec<&WideRow>> {
        let complete: Vec<&WideRow> = self.rows.iter().filter(|row| row.is_complete()).collect();
        if complete.is_empty() {
            return Err(ForecastError::DataIncomplete {
                source_name: self.source_name.clone(),
            });
        }
        tracing::info!(
            source = %self.source_name,
            total = self.rows.len(),
            retained = complete.len(),
            "complete entities retained"
        );
        Ok(complete)
    }

    /// Unadjusted value of the most recent dated column for `entity_id`.
    pub fn latest_actual(&self, entity_id: &str) -> Result<f64> {
        let row = self
            .row(entity_id)
            .ok_or_else(|| ForecastError::UnknownEntity(entity_id.to_string()))?;
        row.values.last().copied().flatten().ok_or_else(|| {
            ForecastError::InsufficientHistory {
                entity: entity_id.to_string(),
                required: self.dates.len(),
                available: row.values.iter().filter(|v| v.is_some()).count(),
            }
        })
    }
}

/// `None` from the outer option means the cell is not a number at all.
fn parse_cell(raw: &str) -> Option<Option<f64>> {
    let cell = raw.trim();
    if cell.is_empty()
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("null")
    {
        return Some(None);
    }
    cell.parse::<f64>().ok().map(Some)
}
