//! LODGESCAN — cost-guided multi-vendor lodging price scanner
//!
//! Entry point. Loads configuration and data tables, initialises
//! structured logging, computes history-driven scan weights when the
//! optimizer is enabled, runs one scan, logs the run to history, and
//! prints a per-country summary.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use lodgescan::cache::ResponseCache;
use lodgescan::config::{self, AppConfig};
use lodgescan::engine::aggregator::ScanAggregator;
use lodgescan::engine::optimizer::compute_scan_weights;
use lodgescan::history::{HistoryGateway, SqliteHistory};
use lodgescan::types::{CountryMetrics, ScanRunResult};

const BANNER: &str = r#"
 _     ___  ____   ____ _____ ____   ____    _    _   _
| |   / _ \|  _ \ / ___| ____/ ___| / ___|  / \  | \ | |
| |  | | | | | | | |  _|  _| \___ \| |     / _ \ |  \| |
| |__| |_| | |_| | |_| | |___ ___) | |___ / ___ \| |\  |
|_____\___/|____/ \____|_____|____/ \____/_/   \_\_| \_|

  Cost-guided lodging price scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        scan_mode = ?cfg.scan.scan_mode,
        base_currency = %cfg.scan.base_currency,
        optimizer = cfg.optimizer.enabled,
        "LODGESCAN starting up"
    );

    // -- Load data tables --------------------------------------------------

    let destinations = config::load_destinations("config/destinations.toml")?;
    let cost_index = config::load_cost_index("config/cost_index.toml")?;
    let fx = config::load_fx_rates("config/fx_rates.toml")?;

    info!(
        destinations = destinations.len(),
        countries = cost_index.len(),
        "Data tables loaded"
    );

    // -- History and optimizer ---------------------------------------------

    let history = SqliteHistory::connect(&cfg.history.db_path)
        .await
        .context("Failed to open history store")?;

    let scan_weights: HashMap<String, f64> = if cfg.optimizer.enabled {
        let summary = history.historical_summary().await?;
        info!(
            countries_with_history = summary.len(),
            "Computing scan weights from cost index and history"
        );
        let weights = compute_scan_weights(&cost_index, &summary, &cfg.optimizer.bounds)?;
        let excluded = weights.values().filter(|w| **w <= 0.0).count();
        info!(excluded, "Scan weights ready");
        weights
    } else {
        HashMap::new()
    };

    // -- Components --------------------------------------------------------

    let vendors = config::build_vendors(&cfg.vendors)?;
    let cache = if cfg.cache.enabled {
        Some(Arc::new(ResponseCache::new(
            &cfg.cache.dir,
            cfg.cache.ttl_seconds,
        )?))
    } else {
        None
    };

    let aggregator = ScanAggregator::new(
        vendors,
        cache,
        fx,
        cfg.scan.clone(),
        cfg.filters,
    );

    // -- Scan --------------------------------------------------------------

    let (checkin, checkout) = cfg.stay.resolve();
    info!(%checkin, %checkout, "Scanning");

    let mut run = aggregator
        .scan(&destinations, &cost_index, &scan_weights, checkin, checkout)
        .await?;

    if cfg.history.log_runs {
        match history.log_run(&run).await {
            Ok(run_id) => run.run_id = run_id,
            Err(e) => warn!(error = %e, "Failed to log run to history"),
        }
    } else {
        info!("Run logging disabled; result not persisted");
    }

    print_summary(&run);
    info!(run = %run, "LODGESCAN finished");

    Ok(())
}

/// Print a per-country table sorted by effective median (unscanned
/// countries last).
fn print_summary(run: &ScanRunResult) {
    let mut rows: Vec<&CountryMetrics> = run.metrics.iter().collect();
    rows.sort_by(|a, b| match (a.effective_median, b.effective_median) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.country_code.cmp(&b.country_code),
    });

    println!(
        "\n{:<4} {:<16} {:>5} {:>9} {:>9} {:>9} {:>11} {:>7}",
        "CC", "Country", "CI", "Min", "Median", "P90", "Eff.Median", "Offers"
    );
    for m in rows {
        println!(
            "{:<4} {:<16} {:>5.2} {:>9} {:>9} {:>9} {:>11} {:>7}",
            m.country_code,
            m.country_name,
            m.cost_index,
            fmt_price(m.min_price),
            fmt_price(m.median_price),
            fmt_price(m.p90_price),
            fmt_price(m.effective_median),
            m.offer_count,
        );
    }
    println!();
}

fn fmt_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lodgescan=info"));

    let json_logging = std::env::var("LODGESCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
