//! Configuration loading from TOML with environment variable resolution.
//!
//! `config.toml` holds the scan settings; the data tables (destinations,
//! cost index, FX rates) live in separate TOML files under `config/`.
//! Secrets (vendor API keys) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tracing::warn;

use crate::engine::aggregator::{QualityFilters, ScanConfig};
use crate::engine::optimizer::OptimizerConfig;
use crate::pricing::FxTable;
use crate::types::Destination;
use crate::vendors::http::HttpVendor;
use crate::vendors::mock::MockVendor;
use crate::vendors::VendorSource;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub stay: StayConfig,
    #[serde(default)]
    pub filters: QualityFilters,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub vendors: VendorsConfig,
}

/// Date window to scan. Explicit dates win (quote them in TOML, e.g.
/// `checkin = "2026-07-10"`); otherwise the window floats `lead_days`
/// ahead of today for `nights` nights.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StayConfig {
    pub checkin: Option<NaiveDate>,
    pub checkout: Option<NaiveDate>,
    pub lead_days: i64,
    pub nights: i64,
}

impl Default for StayConfig {
    fn default() -> Self {
        Self {
            checkin: None,
            checkout: None,
            lead_days: 30,
            nights: 2,
        }
    }
}

impl StayConfig {
    /// Resolve the concrete (checkin, checkout) window for this run.
    pub fn resolve(&self) -> (NaiveDate, NaiveDate) {
        let checkin = self
            .checkin
            .unwrap_or_else(|| chrono::Utc::now().date_naive() + chrono::Duration::days(self.lead_days));
        let checkout = self
            .checkout
            .unwrap_or(checkin + chrono::Duration::days(self.nights.max(1)));
        (checkin, checkout)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerSection {
    /// Whether history-driven scan weights are applied at all.
    pub enabled: bool,
    #[serde(flatten)]
    pub bounds: OptimizerConfig,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            bounds: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "cache/vendors".to_string(),
            ttl_seconds: 43_200, // 12 hours
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub db_path: String,
    /// When false the run still reads the historical summary but is never
    /// written back, and keeps the "not persisted" run id.
    pub log_runs: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: "data/lodgescan.db".to_string(),
            log_runs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VendorsConfig {
    pub mock: MockVendorConfig,
    pub http: HttpVendorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockVendorConfig {
    pub enabled: bool,
    pub name: String,
    pub currency: String,
}

impl Default for MockVendorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "mock_vendor".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpVendorConfig {
    pub enabled: bool,
    pub name: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for HttpVendorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "booking_api".to_string(),
            base_url: None,
            api_key_env: "BOOKING_API_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Data tables
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DestinationsFile {
    destinations: Vec<Destination>,
}

/// Load the destinations table.
pub fn load_destinations(path: &str) -> Result<Vec<Destination>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read destinations file: {path}"))?;
    let file: DestinationsFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse destinations file: {path}"))?;
    Ok(file.destinations)
}

#[derive(Debug, Deserialize)]
struct CostIndexFile {
    cost_index: HashMap<String, f64>,
}

/// Load the country → cost-index table.
pub fn load_cost_index(path: &str) -> Result<HashMap<String, f64>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read cost index file: {path}"))?;
    let file: CostIndexFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse cost index file: {path}"))?;
    Ok(file.cost_index)
}

#[derive(Debug, Deserialize)]
struct FxRatesFile {
    rates: HashMap<String, f64>,
}

/// Load the FX rate table (reference units per 1 unit of each currency).
pub fn load_fx_rates(path: &str) -> Result<FxTable> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read FX rates file: {path}"))?;
    let file: FxRatesFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse FX rates file: {path}"))?;
    Ok(FxTable::new(file.rates))
}

// ---------------------------------------------------------------------------
// Vendor construction
// ---------------------------------------------------------------------------

/// Build the vendor pool from configuration.
///
/// A misconfigured HTTP vendor (missing base URL or API key) is skipped
/// with a warning. If nothing survives, the mock vendor is used so the
/// rest of the pipeline stays runnable.
pub fn build_vendors(cfg: &VendorsConfig) -> Result<Vec<Arc<dyn VendorSource>>> {
    let mut vendors: Vec<Arc<dyn VendorSource>> = Vec::new();

    if cfg.mock.enabled {
        vendors.push(Arc::new(MockVendor::new(
            cfg.mock.name.clone(),
            cfg.mock.currency.clone(),
        )));
    }

    if cfg.http.enabled {
        match (&cfg.http.base_url, std::env::var(&cfg.http.api_key_env)) {
            (Some(base_url), Ok(api_key)) if !api_key.is_empty() => {
                vendors.push(Arc::new(HttpVendor::new(
                    Some(cfg.http.name.clone()),
                    base_url.clone(),
                    api_key,
                    cfg.http.timeout_secs,
                )?));
            }
            (None, _) => {
                warn!(vendor = %cfg.http.name, "base_url not configured, HTTP vendor skipped");
            }
            (_, _) => {
                warn!(
                    vendor = %cfg.http.name,
                    env = %cfg.http.api_key_env,
                    "API key env var not set, HTTP vendor skipped"
                );
            }
        }
    }

    if vendors.is_empty() {
        warn!("No vendors configured/enabled, falling back to the mock vendor");
        vendors.push(Arc::new(MockVendor::default_eur()));
    }

    Ok(vendors)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
