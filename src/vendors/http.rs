//! HTTP client for a Booking-style hotel offer API.
//!
//! The endpoint shape is deliberately conservative: a single JSON search
//! endpoint with destination, date and price parameters, Bearer auth, and
//! a `results` (or `hotels`) array of offer records. Field aliases absorb
//! the common naming variants; records missing a usable price or hotel
//! name are skipped rather than failing the batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PriceFilters, VendorSource};
use crate::types::{Destination, Offer};

const DEFAULT_NAME: &str = "booking_api";

// ---------------------------------------------------------------------------
// API response types (vendor JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, alias = "hotels")]
    results: Vec<OfferRecord>,
}

/// One raw offer record. Everything is optional — the upstream payload is
/// not under our control, and partial records must not poison the batch.
#[derive(Debug, Deserialize)]
struct OfferRecord {
    #[serde(default, alias = "name")]
    hotel_name: Option<String>,
    /// Total stay price; some vendors label it `price_total` or `price`.
    #[serde(default, alias = "price_total", alias = "price")]
    total_price: Option<f64>,
    #[serde(default, alias = "currency_code")]
    currency: Option<String>,
    #[serde(default, alias = "rating")]
    review_score: Option<f64>,
    #[serde(default, alias = "star_rating")]
    stars: Option<u8>,
    #[serde(default, alias = "deeplink")]
    url: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Live hotel offer vendor over HTTP.
pub struct HttpVendor {
    name: String,
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpVendor {
    pub fn new(
        name: Option<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("lodgescan/0.1.0 (hotel-price-scanner)")
            .build()
            .context("Failed to build HTTP client for vendor")?;

        Ok(Self {
            name: name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn search_url(
        &self,
        destination_id: &str,
        checkin: NaiveDate,
        checkout: NaiveDate,
        filters: &PriceFilters,
        limit: u32,
    ) -> String {
        let mut url = format!(
            "{}/offers/search?destination_id={}&checkin={checkin}&checkout={checkout}&page_size={limit}",
            self.base_url,
            urlencoding::encode(destination_id),
        );
        if let Some(min) = filters.min_price {
            url.push_str(&format!("&min_price={min}"));
        }
        if let Some(max) = filters.max_price {
            url.push_str(&format!("&max_price={max}"));
        }
        url
    }

    /// Map a raw record to an [`Offer`]. Returns `None` for records that
    /// lack a hotel name or a positive total price.
    fn to_offer(
        &self,
        record: OfferRecord,
        destination: &Destination,
        checkin: NaiveDate,
        checkout: NaiveDate,
        nights: i64,
    ) -> Option<Offer> {
        let hotel_name = record.hotel_name?;
        let total_price = record.total_price?;
        if !total_price.is_finite() || total_price <= 0.0 {
            debug!(
                vendor = %self.name,
                hotel = %hotel_name,
                "Skipping record with unusable price"
            );
            return None;
        }

        Some(Offer {
            vendor: self.name.clone(),
            country_code: destination.country_code.clone(),
            country_name: destination.country_name.clone(),
            city_name: destination.city_name.clone(),
            checkin,
            checkout,
            hotel_name,
            total_price,
            currency: record.currency.unwrap_or_else(|| "EUR".to_string()),
            price_per_night: total_price / nights as f64,
            rating: record.review_score,
            stars: record.stars,
            deeplink: record.url,
        })
    }
}

#[async_trait]
impl VendorSource for HttpVendor {
    async fn search(
        &self,
        destination: &Destination,
        checkin: NaiveDate,
        checkout: NaiveDate,
        filters: &PriceFilters,
        limit: u32,
    ) -> Result<Vec<Offer>> {
        let nights = (checkout - checkin).num_days();
        if nights <= 0 {
            return Ok(Vec::new());
        }

        // Without a vendor-specific mapping we have nothing to query.
        let Some(destination_id) = destination.vendor_ref.get(&self.name) else {
            debug!(
                vendor = %self.name,
                city = %destination.city_name,
                "No destination mapping, skipping"
            );
            return Ok(Vec::new());
        };

        let url = self.search_url(destination_id, checkin, checkout, filters, limit);
        debug!(vendor = %self.name, url = %url, "Fetching vendor offers");

        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} API error {status}: {body}", self.name);
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} search response", self.name))?;

        let total = parsed.results.len();
        let offers: Vec<Offer> = parsed
            .results
            .into_iter()
            .filter_map(|r| self.to_offer(r, destination, checkin, checkout, nights))
            .filter(|o| filters.accepts(o.price_per_night))
            .collect();

        if offers.len() < total {
            warn!(
                vendor = %self.name,
                city = %destination.city_name,
                skipped = total - offers.len(),
                kept = offers.len(),
                "Some vendor records were malformed or filtered"
            );
        }

        Ok(offers)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
