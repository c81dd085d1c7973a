use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, TransactionBehavior};

use crate::error::{ForecastError, Result};
use crate::model::ForecastSeries;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed store of computed series, keyed by request identity.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = store.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS forecast_results (
                uid INTEGER NOT NULL,
                entity_id TEXT NOT NULL,
                horizon INTEGER NOT NULL,
                price REAL NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY(uid, horizon)
            );
            "#,
        )?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Replaces everything stored for `identity` with `series` in one
    /// transaction.
    pub fn put(&self, identity: i64, series: &ForecastSeries) -> Result<()> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM forecast_results WHERE uid = ?1",
            params![identity],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO forecast_results (uid, entity_id, horizon, price, updated_at_ms)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for (horizon, price) in series.iter() {
                stmt.execute(params![identity, series.entity_id, horizon, price, now_ms])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            uid = identity,
            entity = %series.entity_id,
            replaced = removed,
            written = series.len(),
            "stored forecast"
        );
        Ok(())
    }

    /// The stored series for `identity`, horizons ascending.
    pub fn get(&self, identity: i64) -> Result<ForecastSeries> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entity_id, horizon, price
            FROM forecast_results
            WHERE uid = ?1
            ORDER BY horizon ASC
            "#,
        )?;
        let rows = stmt.query_map(params![identity], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut series: Option<ForecastSeries> = None;
        for row in rows {
            let (entity_id, horizon, price) = row?;
            series
                .get_or_insert_with(|| ForecastSeries::new(entity_id))
                .insert(horizon, price);
        }
        series.ok_or(ForecastError::NotFound(identity))
    }

    /// Writes every stored row as `uid,zip_code,horizon,predicted_price`.
    pub fn export_csv(&self, out: &Path) -> Result<usize> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT uid, entity_id, horizon, price
            FROM forecast_results
            ORDER BY uid ASC, horizon ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut writer = csv::Writer::from_path(out)?;
        writer.write_record(["uid", "zip_code", "horizon", "predicted_price"])?;
        let mut count = 0usize;
        for row in rows {
            let (uid, entity_id, horizon, price) = row?;
            writer.write_record([
                uid.to_string(),
                entity_id,
                horizon.to_string(),
                price.to_string(),
            ])?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    }
}
