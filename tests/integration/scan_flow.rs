//! End-to-end scan scenarios: optimizer weights feeding the aggregator,
//! with the deterministic mock vendor standing in for live sources.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use lodgescan::engine::aggregator::{QualityFilters, ScanAggregator, ScanConfig, ScanMode};
use lodgescan::engine::optimizer::{compute_scan_weights, OptimizerConfig};
use lodgescan::pricing::FxTable;
use lodgescan::types::Destination;
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

fn fx_eur() -> FxTable {
    FxTable::new(HashMap::from([("EUR".to_string(), 1.0)]))
}

fn dates() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
        NaiveDate::from_ymd_opt(2026, 7, 12).unwrap(),
    )
}

fn aggregator(config: ScanConfig) -> ScanAggregator {
    let vendors: Vec<Arc<dyn VendorSource>> = vec![Arc::new(MockVendor::default_eur())];
    ScanAggregator::new(vendors, None, fx_eur(), config, QualityFilters::default())
}

/// Two countries, no history: the cheaper prior gets a strictly higher
/// weight and a wider scan, and cost-adjusted prices never undercut raw
/// prices for the pricier country.
#[tokio::test]
async fn test_two_country_scan_with_optimizer() {
    let cost_index = HashMap::from([("BG".to_string(), 1.0), ("DK".to_string(), 2.0)]);
    let config = OptimizerConfig {
        top_k: None,
        min_weight: 0.5,
        max_weight: 2.0,
    };

    let weights = compute_scan_weights(&cost_index, &HashMap::new(), &config).unwrap();
    assert!(
        weights["BG"] > weights["DK"],
        "cheaper prior must earn strictly more scan budget"
    );

    let destinations = vec![
        dest("BG", "Bulgaria", "Sofia"),
        dest("BG", "Bulgaria", "Plovdiv"),
        dest("BG", "Bulgaria", "Varna"),
        dest("BG", "Bulgaria", "Burgas"),
        dest("DK", "Denmark", "Copenhagen"),
        dest("DK", "Denmark", "Aarhus"),
        dest("DK", "Denmark", "Odense"),
        dest("DK", "Denmark", "Aalborg"),
    ];

    let agg = aggregator(ScanConfig {
        scan_mode: ScanMode::All,
        base_cities_per_country: 2,
        base_offers_per_destination: 10,
        alpha: 1.0,
        ..ScanConfig::default()
    });

    let (checkin, checkout) = dates();
    let run = agg
        .scan(&destinations, &cost_index, &weights, checkin, checkout)
        .await
        .unwrap();

    assert_eq!(run.metrics.len(), 2);
    let bg = run.metrics.iter().find(|m| m.country_code == "BG").unwrap();
    let dk = run.metrics.iter().find(|m| m.country_code == "DK").unwrap();

    for m in [bg, dk] {
        assert!(m.has_offers(), "{} should have offers", m.country_code);
        assert!(m.min_price.is_some());
        assert!(m.median_price.is_some());
        assert!(m.p90_price.is_some());
    }

    // alpha = 1, cost index 2.0: effective prices sit above raw prices.
    assert!(dk.effective_median.unwrap() >= dk.median_price.unwrap());
    assert!((dk.effective_min.unwrap() - dk.min_price.unwrap() * 2.0).abs() < 1e-9);
    // alpha = 1, cost index 1.0: effective equals raw.
    assert!((bg.effective_median.unwrap() - bg.median_price.unwrap()).abs() < 1e-9);

    // The higher weight and lower cost index widen the scan: more cities,
    // hence more surviving offers.
    assert!(
        bg.offer_count > dk.offer_count,
        "BG ({}) should out-scan DK ({})",
        bg.offer_count,
        dk.offer_count
    );
}

/// A top-k cut excludes a country from vendor calls but keeps its empty
/// record in the run result.
#[tokio::test]
async fn test_top_k_exclusion_flows_through_scan() {
    let cost_index = HashMap::from([("BG".to_string(), 1.0), ("DK".to_string(), 2.0)]);
    let config = OptimizerConfig {
        top_k: Some(1),
        min_weight: 0.5,
        max_weight: 2.0,
    };

    let weights = compute_scan_weights(&cost_index, &HashMap::new(), &config).unwrap();
    assert_eq!(weights["DK"], 0.0);

    let destinations = vec![
        dest("BG", "Bulgaria", "Sofia"),
        dest("DK", "Denmark", "Copenhagen"),
    ];
    let agg = aggregator(ScanConfig {
        scan_mode: ScanMode::All,
        base_offers_per_destination: 10,
        ..ScanConfig::default()
    });

    let (checkin, checkout) = dates();
    let run = agg
        .scan(&destinations, &cost_index, &weights, checkin, checkout)
        .await
        .unwrap();

    assert_eq!(run.metrics.len(), 2, "excluded countries stay in the result");
    let dk = run.metrics.iter().find(|m| m.country_code == "DK").unwrap();
    assert!(!dk.has_offers());
    assert!(dk.median_price.is_none());
    let bg = run.metrics.iter().find(|m| m.country_code == "BG").unwrap();
    assert!(bg.has_offers());
}

/// A "scan nothing" configuration is valid: every record comes back empty
/// and no vendor is consulted.
#[tokio::test]
async fn test_top_k_zero_scans_nothing() {
    let cost_index = HashMap::from([("BG".to_string(), 1.0), ("DK".to_string(), 2.0)]);
    let weights = compute_scan_weights(
        &cost_index,
        &HashMap::new(),
        &OptimizerConfig {
            top_k: Some(0),
            min_weight: 0.5,
            max_weight: 2.0,
        },
    )
    .unwrap();

    let destinations = vec![
        dest("BG", "Bulgaria", "Sofia"),
        dest("DK", "Denmark", "Copenhagen"),
    ];
    let agg = aggregator(ScanConfig {
        scan_mode: ScanMode::All,
        ..ScanConfig::default()
    });

    let (checkin, checkout) = dates();
    let run = agg
        .scan(&destinations, &cost_index, &weights, checkin, checkout)
        .await
        .unwrap();

    assert_eq!(run.metrics.len(), 2);
    assert_eq!(run.countries_with_offers(), 0);
    assert_eq!(run.total_offers(), 0);
}
