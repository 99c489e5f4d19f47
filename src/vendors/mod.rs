//! Vendor integrations.
//!
//! Defines the `VendorSource` trait and provides implementations for:
//! - MockVendor — deterministic synthetic offers for development and tests
//! - HttpVendor — a live Booking-style JSON API client
//!
//! Vendors normalise their raw payloads into [`Offer`] records; everything
//! downstream (caching, conversion, dedupe, statistics) is vendor-agnostic.

pub mod http;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{Destination, Offer};

/// Nightly-price bounds forwarded to vendors and folded into cache keys.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceFilters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl PriceFilters {
    /// Whether a nightly price falls inside the configured bounds.
    pub fn accepts(&self, price_per_night: f64) -> bool {
        if let Some(min) = self.min_price {
            if price_per_night < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if price_per_night > max {
                return false;
            }
        }
        true
    }
}

/// Abstraction over hotel offer vendors.
///
/// Implementors answer "give me offers for a destination and date range".
/// A failed upstream call surfaces as an error; the aggregator absorbs it
/// as zero offers for that (destination, vendor) pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VendorSource: Send + Sync {
    /// Fetch up to `limit` offers for a destination and date range.
    async fn search(
        &self,
        destination: &Destination,
        checkin: NaiveDate,
        checkout: NaiveDate,
        filters: &PriceFilters,
        limit: u32,
    ) -> Result<Vec<Offer>>;

    /// Vendor name for logging, dedupe attribution, and cache keys.
    fn name(&self) -> &str;
}
