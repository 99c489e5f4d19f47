//! The feedback loop: scan results logged to history, read back as a
//! summary, and folded into the next run's scan weights.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use lodgescan::engine::aggregator::{QualityFilters, ScanAggregator, ScanConfig, ScanMode};
use lodgescan::engine::optimizer::{compute_scan_weights, OptimizerConfig};
use lodgescan::history::{HistoryGateway, SqliteHistory};
use lodgescan::pricing::FxTable;
use lodgescan::types::{CountryMetrics, Destination, ScanRunResult, RUN_NOT_PERSISTED};
use lodgescan::vendors::mock::MockVendor;
use lodgescan::vendors::VendorSource;

fn dest(country_code: &str, country_name: &str, city_name: &str) -> Destination {
    Destination {
        country_code: country_code.to_string(),
        country_name: country_name.to_string(),
        city_name: city_name.to_string(),
        vendor_ref: HashMap::new(),
    }
}

fn dates() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
        NaiveDate::from_ymd_opt(2026, 7, 12).unwrap(),
    )
}

fn metrics(code: &str, name: &str, ci: f64, median: f64) -> CountryMetrics {
    let mut m = CountryMetrics::empty(code, name, ci, "EUR");
    m.min_price = Some(median * 0.5);
    m.median_price = Some(median);
    m.p90_price = Some(median * 1.8);
    m.effective_min = Some(median * 0.5 * ci);
    m.effective_median = Some(median * ci);
    m.offer_count = 10;
    m
}

fn run_with(metrics_list: Vec<CountryMetrics>) -> ScanRunResult {
    let (checkin, checkout) = dates();
    ScanRunResult {
        run_id: RUN_NOT_PERSISTED,
        checkin,
        checkout,
        base_currency: "EUR".to_string(),
        alpha: 1.0,
        vendors: vec!["mock_vendor".to_string()],
        metrics: metrics_list,
    }
}

/// Scan → log → summary → weights, end to end against SQLite.
#[tokio::test]
async fn test_scan_log_summary_weights_cycle() {
    let history = SqliteHistory::connect_in_memory().await.unwrap();
    let cost_index = HashMap::from([("BG".to_string(), 1.0), ("PT".to_string(), 1.3)]);
    let destinations = vec![
        dest("BG", "Bulgaria", "Sofia"),
        dest("PT", "Portugal", "Porto"),
    ];

    let vendors: Vec<Arc<dyn VendorSource>> = vec![Arc::new(MockVendor::default_eur())];
    let agg = ScanAggregator::new(
        vendors,
        None,
        FxTable::new(HashMap::from([("EUR".to_string(), 1.0)])),
        ScanConfig {
            scan_mode: ScanMode::All,
            base_offers_per_destination: 10,
            ..ScanConfig::default()
        },
        QualityFilters::default(),
    );

    let (checkin, checkout) = dates();
    let mut run = agg
        .scan(&destinations, &cost_index, &HashMap::new(), checkin, checkout)
        .await
        .unwrap();

    // Fresh results are unsaved until the caller logs them.
    assert!(!run.is_persisted());

    run.run_id = history.log_run(&run).await.unwrap();
    assert!(run.is_persisted());

    let summary = history.historical_summary().await.unwrap();
    assert!(summary.contains_key("BG"));
    assert!(summary.contains_key("PT"));
    let bg = summary.get("BG").unwrap();
    assert!(bg.avg_median_price > 0.0);
    assert!(bg.normalized_median > 0.0);

    // The summary feeds straight back into weight computation.
    let weights = compute_scan_weights(&cost_index, &summary, &OptimizerConfig::default()).unwrap();
    assert_eq!(weights.len(), 2);
    assert!(weights.values().all(|w| *w > 0.0));
}

/// History redirects budget toward observed mispricing: with equal priors,
/// the country whose past medians ran cheaper gets the higher weight.
#[tokio::test]
async fn test_history_shifts_weights_toward_cheap_observations() {
    let history = SqliteHistory::connect_in_memory().await.unwrap();

    // Two runs of observations: AA consistently cheap, BB consistently
    // expensive, identical priors.
    for (aa_median, bb_median) in [(20.0, 80.0), (24.0, 76.0)] {
        history
            .log_run(&run_with(vec![
                metrics("AA", "Aland", 1.2, aa_median),
                metrics("BB", "Borland", 1.2, bb_median),
            ]))
            .await
            .unwrap();
    }

    let summary = history.historical_summary().await.unwrap();
    assert!(summary["AA"].normalized_median < summary["BB"].normalized_median);

    let cost_index = HashMap::from([("AA".to_string(), 1.2), ("BB".to_string(), 1.2)]);
    let weights = compute_scan_weights(&cost_index, &summary, &OptimizerConfig::default()).unwrap();

    assert!(
        weights["AA"] > weights["BB"],
        "observed mispricing must outrank the identical prior"
    );
}

/// The summary is readable without ever logging, so a logging-disabled run
/// can still drive the optimizer.
#[tokio::test]
async fn test_summary_without_logging() {
    let history = SqliteHistory::connect_in_memory().await.unwrap();
    let summary = history.historical_summary().await.unwrap();
    assert!(summary.is_empty());

    let cost_index = HashMap::from([("BG".to_string(), 1.0)]);
    let weights = compute_scan_weights(&cost_index, &summary, &OptimizerConfig::default()).unwrap();
    assert!(weights["BG"] > 0.0);
}
