//! Run history persistence.
//!
//! Saves scan runs to SQLite and serves the aggregated historical summary
//! the optimizer feeds on. The engine never holds cross-run state itself —
//! each run is a pure function of its inputs plus this summary, so the
//! feedback loop between observation and allocation passes entirely
//! through this boundary.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{HistoricalSummaryEntry, ScanRunResult};

// ---------------------------------------------------------------------------
// Gateway contract
// ---------------------------------------------------------------------------

/// Persistence boundary for scan runs.
///
/// `log_run` returns the assigned run id; `historical_summary` must work
/// whether or not any runs were ever logged, so a logging-disabled run can
/// still feed the optimizer.
#[async_trait]
pub trait HistoryGateway: Send + Sync {
    async fn log_run(&self, run: &ScanRunResult) -> Result<i64>;

    async fn historical_summary(&self) -> Result<HashMap<String, HistoricalSummaryEntry>>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed history store.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the history database at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open history database at {path}"))?;

        let history = Self { pool };
        history.init_schema().await?;
        Ok(history)
    }

    /// In-memory history for tests. Pinned to a single connection — each
    /// SQLite in-memory connection is its own database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory history database")?;

        let history = Self { pool };
        history.init_schema().await?;
        Ok(history)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_utc TEXT NOT NULL,
                checkin TEXT NOT NULL,
                checkout TEXT NOT NULL,
                base_currency TEXT NOT NULL,
                alpha REAL NOT NULL,
                vendors TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create runs table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS country_metrics (
                run_id INTEGER NOT NULL,
                country_code TEXT NOT NULL,
                country_name TEXT NOT NULL,
                cost_index REAL NOT NULL,
                min_price REAL,
                median_price REAL,
                p90_price REAL,
                effective_min REAL,
                effective_median REAL,
                offer_count INTEGER NOT NULL,
                PRIMARY KEY (run_id, country_code),
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create country_metrics table")?;

        Ok(())
    }

    /// Id of the most recent run, if any.
    pub async fn latest_run_id(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM runs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read latest run id")?;
        Ok(row.map(|r| r.get::<i64, _>("id")))
    }
}

#[async_trait]
impl HistoryGateway for SqliteHistory {
    /// Persist a run and its per-country metrics, returning the run id.
    ///
    /// Only countries that produced offers are written; empty records would
    /// drag the AVG-based summary toward zero.
    async fn log_run(&self, run: &ScanRunResult) -> Result<i64> {
        let res = sqlx::query(
            "INSERT INTO runs (created_utc, checkin, checkout, base_currency, alpha, vendors)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(run.checkin.to_string())
        .bind(run.checkout.to_string())
        .bind(&run.base_currency)
        .bind(run.alpha)
        .bind(run.vendors.join(","))
        .execute(&self.pool)
        .await
        .context("Failed to insert run")?;

        let run_id = res.last_insert_rowid();

        for m in run.metrics.iter().filter(|m| m.has_offers()) {
            sqlx::query(
                "INSERT OR REPLACE INTO country_metrics
                 (run_id, country_code, country_name, cost_index,
                  min_price, median_price, p90_price, effective_min, effective_median,
                  offer_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(&m.country_code)
            .bind(&m.country_name)
            .bind(m.cost_index)
            .bind(m.min_price)
            .bind(m.median_price)
            .bind(m.p90_price)
            .bind(m.effective_min)
            .bind(m.effective_median)
            .bind(m.offer_count as i64)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert metrics for {}", m.country_code))?;
        }

        info!(
            run_id,
            countries = run.metrics.iter().filter(|m| m.has_offers()).count(),
            "Run logged to history"
        );

        Ok(run_id)
    }

    /// Aggregate median prices across all runs and derive the normalized
    /// median used by the optimizer.
    async fn historical_summary(&self) -> Result<HashMap<String, HistoricalSummaryEntry>> {
        let rows = sqlx::query(
            "SELECT country_code, country_name, cost_index,
                    AVG(median_price) AS avg_median_price,
                    AVG(effective_median) AS avg_effective_median
             FROM country_metrics
             GROUP BY country_code, country_name, cost_index",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read historical summary")?;

        let mut summary = HashMap::with_capacity(rows.len());
        for row in rows {
            let country_code: String = row.get("country_code");
            let country_name: String = row.get("country_name");
            let cost_index: f64 = row.get("cost_index");
            let avg_median: Option<f64> = row.get("avg_median_price");
            let avg_effective: Option<f64> = row.get("avg_effective_median");

            let Some(avg_median_price) = avg_median else {
                continue;
            };
            let normalized_median = if cost_index > 0.0 {
                avg_median_price / cost_index
            } else {
                avg_median_price
            };

            debug!(
                country = %country_code,
                avg_median_price,
                normalized_median,
                "Historical summary row"
            );

            summary.insert(
                country_code.clone(),
                HistoricalSummaryEntry {
                    country_code,
                    country_name,
                    cost_index,
                    avg_median_price,
                    avg_effective_median: avg_effective.unwrap_or(0.0),
                    normalized_median,
                },
            );
        }

        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
