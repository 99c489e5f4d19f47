//! Shared types for the LODGESCAN engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that vendor, engine, and
//! history modules can depend on them without circular references.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sentinel run identifier for results that were never written to history.
pub const RUN_NOT_PERSISTED: i64 = -1;

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// A scannable city, loaded once per run from the destinations table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// ISO country code: "BG"
    pub country_code: String,
    /// Human-readable country name: "Bulgaria"
    pub country_name: String,
    /// City name: "Sofia"
    pub city_name: String,
    /// Vendor-specific destination identifiers, e.g. {"booking_api": "12345"}.
    #[serde(default)]
    pub vendor_ref: HashMap<String, String>,
}

impl Destination {
    /// The identifier a vendor should use for this destination.
    /// Falls back to "<country>/<city>" when no vendor-specific mapping exists.
    pub fn vendor_id(&self, vendor: &str) -> String {
        self.vendor_ref
            .get(vendor)
            .cloned()
            .unwrap_or_else(|| format!("{}/{}", self.country_code, self.city_name))
    }

    /// Helper to build a test destination without vendor mappings.
    #[cfg(test)]
    pub fn sample(country_code: &str, country_name: &str, city_name: &str) -> Self {
        Destination {
            country_code: country_code.to_string(),
            country_name: country_name.to_string(),
            city_name: city_name.to_string(),
            vendor_ref: HashMap::new(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} [{}]", self.city_name, self.country_name, self.country_code)
    }
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// A single normalised hotel offer produced by a vendor source.
///
/// Immutable once created; consumed by the aggregator to build
/// [`CountryMetrics`] and discardable afterwards. Serialisable so raw
/// vendor results can be cached between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    /// Vendor identifier: "mock_vendor" | "booking_api"
    pub vendor: String,
    pub country_code: String,
    pub country_name: String,
    pub city_name: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub hotel_name: String,
    /// Total stay price in the vendor's currency.
    pub total_price: f64,
    /// ISO currency code of the vendor's quote.
    pub currency: String,
    /// Nightly price in the vendor's currency.
    pub price_per_night: f64,
    /// Guest review score (0–10), when the vendor provides one.
    pub rating: Option<f64>,
    /// Official star class (1–5), when the vendor provides one.
    pub stars: Option<u8>,
    /// Deep link back to the vendor's listing.
    pub deeplink: Option<String>,
}

impl Offer {
    /// Number of nights covered by this offer.
    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    /// Key used for soft dedupe across vendors: the same hotel in the same
    /// city collapses to one offer regardless of which vendor surfaced it.
    pub fn dedupe_key(&self) -> (String, String) {
        (
            self.city_name.trim().to_lowercase(),
            self.hotel_name.trim().to_lowercase(),
        )
    }

    /// Whether the nightly price is a usable number. Vendors occasionally
    /// emit zero or NaN prices for sold-out listings; those records are
    /// dropped rather than folded into statistics.
    pub fn is_priced(&self) -> bool {
        self.price_per_night.is_finite() && self.price_per_night > 0.0
    }

    /// Helper to build a test offer with sensible defaults.
    #[cfg(test)]
    pub fn sample(city: &str, hotel: &str, price_per_night: f64) -> Self {
        Offer {
            vendor: "mock_vendor".to_string(),
            country_code: "BG".to_string(),
            country_name: "Bulgaria".to_string(),
            city_name: city.to_string(),
            checkin: NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2026, 7, 12).unwrap(),
            hotel_name: hotel.to_string(),
            total_price: price_per_night * 2.0,
            currency: "EUR".to_string(),
            price_per_night,
            rating: Some(8.2),
            stars: Some(3),
            deeplink: None,
        }
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} — {} {:.2} {}/night",
            self.vendor, self.city_name, self.hotel_name, self.price_per_night, self.currency,
        )
    }
}

// ---------------------------------------------------------------------------
// Country metrics
// ---------------------------------------------------------------------------

/// Per-country price statistics for one scan run.
///
/// All price fields are in the run's base currency. A country that produced
/// no usable offers (excluded by the optimizer, filtered out, or simply
/// empty) keeps its record with every statistic absent and a zero count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryMetrics {
    pub country_code: String,
    pub country_name: String,
    /// Cost-index prior used for this country during the run.
    pub cost_index: f64,
    /// Base currency the statistics are expressed in.
    pub currency: String,
    pub min_price: Option<f64>,
    pub median_price: Option<f64>,
    pub p90_price: Option<f64>,
    /// min_price * cost_index^alpha
    pub effective_min: Option<f64>,
    /// median_price * cost_index^alpha
    pub effective_median: Option<f64>,
    /// Median over offers with a rating at or above the configured floor.
    pub median_high_rating: Option<f64>,
    /// Median over offers with a star class at or above the configured floor.
    pub median_three_stars: Option<f64>,
    /// Offers surviving filters and dedupe.
    pub offer_count: u32,
    /// Offers that met the high-rating floor.
    pub offer_count_high_rating: u32,
}

impl CountryMetrics {
    /// An empty record for a country that yielded no usable offers.
    pub fn empty(country_code: &str, country_name: &str, cost_index: f64, currency: &str) -> Self {
        CountryMetrics {
            country_code: country_code.to_string(),
            country_name: country_name.to_string(),
            cost_index,
            currency: currency.to_string(),
            min_price: None,
            median_price: None,
            p90_price: None,
            effective_min: None,
            effective_median: None,
            median_high_rating: None,
            median_three_stars: None,
            offer_count: 0,
            offer_count_high_rating: 0,
        }
    }

    /// Whether this record carries any statistics.
    pub fn has_offers(&self) -> bool {
        self.offer_count > 0
    }
}

impl fmt::Display for CountryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min_price, self.median_price, self.effective_median) {
            (Some(min), Some(med), Some(eff)) => write!(
                f,
                "{} ({}): min {:.0} / median {:.0} / eff. median {:.0} {} over {} offers (ci {:.2})",
                self.country_name,
                self.country_code,
                min,
                med,
                eff,
                self.currency,
                self.offer_count,
                self.cost_index,
            ),
            _ => write!(
                f,
                "{} ({}): no offers (ci {:.2})",
                self.country_name, self.country_code, self.cost_index,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Scan run result
// ---------------------------------------------------------------------------

/// The outcome of one scan invocation — the unit exchanged with history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRunResult {
    /// Assigned by the history gateway on persist; [`RUN_NOT_PERSISTED`]
    /// for runs that were never logged.
    pub run_id: i64,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub base_currency: String,
    /// Cost-index exponent applied to effective prices.
    pub alpha: f64,
    /// Names of the vendor sources consulted.
    pub vendors: Vec<String>,
    /// One record per scanned country, ordered by country code.
    pub metrics: Vec<CountryMetrics>,
}

impl ScanRunResult {
    pub fn is_persisted(&self) -> bool {
        self.run_id != RUN_NOT_PERSISTED
    }

    /// Countries that produced at least one usable offer.
    pub fn countries_with_offers(&self) -> usize {
        self.metrics.iter().filter(|m| m.has_offers()).count()
    }

    /// Total deduped offers across all countries.
    pub fn total_offers(&self) -> u64 {
        self.metrics.iter().map(|m| m.offer_count as u64).sum()
    }
}

impl fmt::Display for ScanRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} [{} → {}]: {} countries ({} with offers), {} offers, vendors: {}",
            if self.is_persisted() {
                self.run_id.to_string()
            } else {
                "unsaved".to_string()
            },
            self.checkin,
            self.checkout,
            self.metrics.len(),
            self.countries_with_offers(),
            self.total_offers(),
            self.vendors.join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Historical summary
// ---------------------------------------------------------------------------

/// Read-only per-country view over past runs, served by the history gateway
/// and consumed only by the scan-weight optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSummaryEntry {
    pub country_code: String,
    pub country_name: String,
    pub cost_index: f64,
    /// Mean of median nightly prices across past runs.
    pub avg_median_price: f64,
    /// Mean of effective medians across past runs.
    pub avg_effective_median: f64,
    /// avg_median_price / cost_index. Low values mean the country is
    /// cheaper than its prior suggests.
    pub normalized_median: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for LODGESCAN.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Vendor error ({vendor}): {message}")]
    Vendor { vendor: String, message: String },

    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scan cancelled before any destination completed")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
