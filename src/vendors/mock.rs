//! Synthetic vendor used for development and testing.
//!
//! Generates pseudo-random nightly prices for each destination. The RNG is
//! seeded from the (vendor, destination, date range) tuple, so repeating a
//! query yields the same offers — which keeps cache behaviour and test
//! assertions stable without any network access.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

use super::{PriceFilters, VendorSource};
use crate::types::{Destination, Offer};

const DEFAULT_NAME: &str = "mock_vendor";

/// Deterministic synthetic offer generator.
pub struct MockVendor {
    name: String,
    currency: String,
}

impl MockVendor {
    pub fn new(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            currency: currency.into(),
        }
    }

    /// Mock vendor with the default name, quoting in EUR.
    pub fn default_eur() -> Self {
        Self::new(DEFAULT_NAME, "EUR")
    }

    fn seed_for(&self, destination: &Destination, checkin: NaiveDate, checkout: NaiveDate) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        destination.country_code.hash(&mut hasher);
        destination.city_name.hash(&mut hasher);
        checkin.hash(&mut hasher);
        checkout.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl VendorSource for MockVendor {
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

        let mut rng = StdRng::seed_from_u64(self.seed_for(destination, checkin, checkout));
        let mut offers = Vec::new();

        for _ in 0..limit {
            let base: f64 = rng.gen_range(20.0..200.0); // nightly price
            let rating = (rng.gen_range(6.5..9.5_f64) * 10.0).round() / 10.0;
            let stars = rng.gen_range(1..=5u8);
            let hotel_no = rng.gen_range(1..=999u32);

            if !filters.accepts(base) {
                continue;
            }

            offers.push(Offer {
                vendor: self.name.clone(),
                country_code: destination.country_code.clone(),
                country_name: destination.country_name.clone(),
                city_name: destination.city_name.clone(),
                checkin,
                checkout,
                hotel_name: format!("{} Hotel {hotel_no}", destination.city_name),
                total_price: base * nights as f64,
                currency: self.currency.clone(),
                price_per_night: base,
                rating: Some(rating),
                stars: Some(stars),
                deeplink: None,
            });
        }

        debug!(
            vendor = %self.name,
            city = %destination.city_name,
            offers = offers.len(),
            "Synthetic offers generated"
        );

        Ok(offers)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
