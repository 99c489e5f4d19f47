//! Cost-guided scan engine with multi-vendor aggregation.
//!
//! For each destination country the aggregator derives a scan breadth from
//! the cost-index prior and the optimizer's weight, fans out over
//! (destination × vendor) pairs with a bounded worker pool, normalises
//! offers into the base currency, soft-dedupes the same hotel across
//! vendors, and folds the survivors into per-country price statistics.
//!
//! Statistics are computed over the complete deduped set, never in arrival
//! order, so results are deterministic regardless of fetch interleaving.
//! A failing or timed-out vendor call contributes zero offers; only
//! configuration problems abort a run before it starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::pricing::{effective_price, FxTable};
use crate::types::{
    CountryMetrics, Destination, Offer, ScanError, ScanRunResult, RUN_NOT_PERSISTED,
};
use crate::vendors::{PriceFilters, VendorSource};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Country pre-selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Skip countries whose cost index exceeds `max_cost_index_for_scan`.
    #[default]
    CheapOnly,
    /// Scan every country the optimizer lets through.
    All,
}

/// Scan breadth and runtime limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub scan_mode: ScanMode,
    /// Cost-index ceiling applied in [`ScanMode::CheapOnly`].
    pub max_cost_index_for_scan: f64,
    /// Cities per country before weight/cost-index scaling.
    pub base_cities_per_country: u32,
    /// Offers per destination before weight/cost-index scaling.
    pub base_offers_per_destination: u32,
    /// Cost-index exponent for effective prices.
    pub alpha: f64,
    /// Currency all statistics are expressed in.
    pub base_currency: String,
    /// Per-vendor-call timeout; a timed-out call counts as failed.
    pub vendor_timeout_secs: u64,
    /// Bound on concurrent (destination × vendor) fetches.
    pub max_concurrent_fetches: usize,
    /// Overall wall-clock budget for the fetch phase. When it runs out,
    /// in-flight fetches are abandoned and completed ones still count.
    pub run_deadline_secs: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::CheapOnly,
            max_cost_index_for_scan: 1.8,
            base_cities_per_country: 3,
            base_offers_per_destination: 50,
            alpha: 1.0,
            base_currency: "EUR".to_string(),
            vendor_timeout_secs: 10,
            max_concurrent_fetches: 8,
            run_deadline_secs: None,
        }
    }
}

/// Per-offer quality thresholds and segmented-median floors.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct QualityFilters {
    /// Nightly price bounds, also forwarded to vendors.
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Offers without a rating fail this filter when it is set.
    pub min_rating: Option<f64>,
    /// Offers without a star class fail this filter when it is set.
    pub min_stars: Option<u8>,
    /// Rating floor for the high-rating segmented median.
    pub high_rating_floor: f64,
    /// Star floor for the star-segmented median.
    pub stars_floor: u8,
}

impl Default for QualityFilters {
    fn default() -> Self {
        Self {
            min_price: None,
            max_price: None,
            min_rating: None,
            min_stars: None,
            high_rating_floor: 8.0,
            stars_floor: 3,
        }
    }
}

impl QualityFilters {
    pub fn price_filters(&self) -> PriceFilters {
        PriceFilters {
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }

    fn passes(&self, offer: &Offer) -> bool {
        if let Some(floor) = self.min_rating {
            match offer.rating {
                Some(r) if r >= floor => {}
                _ => return false,
            }
        }
        if let Some(floor) = self.min_stars {
            match offer.stars {
                Some(s) if s >= floor => {}
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// An offer together with its nightly price in the base currency.
#[derive(Debug, Clone)]
struct PricedOffer {
    offer: Offer,
    price_base: f64,
}

struct FetchJob<'a> {
    country: String,
    destination: &'a Destination,
    vendor: Arc<dyn VendorSource>,
    limit: u32,
}

/// The orchestration core: scan → normalise → dedupe → aggregate.
pub struct ScanAggregator {
    vendors: Vec<Arc<dyn VendorSource>>,
    cache: Option<Arc<ResponseCache>>,
    fx: FxTable,
    config: ScanConfig,
    filters: QualityFilters,
}

impl ScanAggregator {
    pub fn new(
        vendors: Vec<Arc<dyn VendorSource>>,
        cache: Option<Arc<ResponseCache>>,
        fx: FxTable,
        config: ScanConfig,
        filters: QualityFilters,
    ) -> Self {
        Self {
            vendors,
            cache,
            fx,
            config,
            filters,
        }
    }

    /// Run one scan over the given destinations.
    ///
    /// `scan_weights` defaults missing countries to 1.0; a weight of 0 (or
    /// below) excludes the country from vendor calls while keeping its
    /// empty record in the result. Returns [`ScanError::Cancelled`] only
    /// when the run deadline expires before any fetch completed.
    pub async fn scan(
        &self,
        destinations: &[Destination],
        cost_index: &HashMap<String, f64>,
        scan_weights: &HashMap<String, f64>,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<ScanRunResult> {
        validate_cost_index(cost_index)?;
        validate_weights(scan_weights)?;

        // Group destinations by country; BTreeMap keeps result order stable.
        let mut by_country: BTreeMap<String, Vec<&Destination>> = BTreeMap::new();
        let mut country_names: HashMap<String, String> = HashMap::new();
        for dest in destinations {
            by_country
                .entry(dest.country_code.clone())
                .or_default()
                .push(dest);
            country_names
                .entry(dest.country_code.clone())
                .or_insert_with(|| dest.country_name.clone());
        }

        // Build the fetch plan: which cities, how many offers each.
        let mut jobs: Vec<FetchJob<'_>> = Vec::new();
        for (country, dests) in &by_country {
            let ci = cost_index.get(country).copied().unwrap_or(1.0);
            let weight = scan_weights.get(country).copied().unwrap_or(1.0);

            if weight <= 0.0 {
                debug!(country = %country, "Excluded by scan weight");
                continue;
            }
            if self.config.scan_mode == ScanMode::CheapOnly
                && ci > self.config.max_cost_index_for_scan
            {
                debug!(country = %country, cost_index = ci, "Over cheap-only ceiling");
                continue;
            }

            let target_cities = (self.config.base_cities_per_country as f64 * weight / ci)
                .round() as usize;
            let target_cities = target_cities.clamp(1, dests.len());
            let max_offers = ((self.config.base_offers_per_destination as f64 * weight / ci)
                .round() as u32)
                .max(10);

            let mut selected: Vec<&Destination> = dests.clone();
            selected.sort_by(|a, b| a.city_name.cmp(&b.city_name));
            selected.truncate(target_cities);

            debug!(
                country = %country,
                cost_index = ci,
                weight,
                cities = target_cities,
                offers_per_city = max_offers,
                "Country scan breadth"
            );

            for dest in selected {
                for vendor in &self.vendors {
                    jobs.push(FetchJob {
                        country: country.clone(),
                        destination: dest,
                        vendor: Arc::clone(vendor),
                        limit: max_offers,
                    });
                }
            }
        }

        info!(
            countries = by_country.len(),
            fetches = jobs.len(),
            vendors = self.vendors.len(),
            "Starting scan"
        );

        let fetched = self.run_fetches(jobs, checkin, checkout).await?;

        // Normalise, filter, and pool offers per country.
        let mut offers_by_country: BTreeMap<String, Vec<PricedOffer>> = BTreeMap::new();
        for (country, offers) in fetched {
            let pool = offers_by_country.entry(country).or_default();
            for offer in offers {
                if !offer.is_priced() {
                    debug!(offer = %offer, "Dropping offer without a usable price");
                    continue;
                }
                let price_base = match self.fx.convert(
                    offer.price_per_night,
                    &offer.currency,
                    &self.config.base_currency,
                ) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(offer = %offer, error = %e, "Dropping unconvertible offer");
                        continue;
                    }
                };
                if !self.filters.passes(&offer) {
                    continue;
                }
                pool.push(PricedOffer { offer, price_base });
            }
        }

        // Per-country dedupe and statistics. Every scanned country keeps a
        // record, offers or not.
        let mut metrics = Vec::with_capacity(by_country.len());
        for country in by_country.keys() {
            let ci = cost_index.get(country).copied().unwrap_or(1.0);
            let name = country_names.get(country).cloned().unwrap_or_default();
            let pool = offers_by_country.remove(country).unwrap_or_default();
            let deduped = dedupe_cheapest(pool);
            metrics.push(self.country_metrics(country, &name, ci, &deduped));
        }

        let result = ScanRunResult {
            run_id: RUN_NOT_PERSISTED,
            checkin,
            checkout,
            base_currency: self.config.base_currency.clone(),
            alpha: self.config.alpha,
            vendors: self.vendors.iter().map(|v| v.name().to_string()).collect(),
            metrics,
        };

        info!(
            countries = result.metrics.len(),
            with_offers = result.countries_with_offers(),
            offers = result.total_offers(),
            "Scan complete"
        );

        Ok(result)
    }

    // -- Fetch phase -----------------------------------------------------

    /// Drive all fetch jobs through a bounded pool, honouring the optional
    /// run deadline. Returns per-(destination, vendor) offer batches.
    async fn run_fetches(
        &self,
        jobs: Vec<FetchJob<'_>>,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<Vec<(String, Vec<Offer>)>> {
        let fetch_stream = stream::iter(jobs.into_iter().map(|job| async move {
            let offers = self.fetch_offers(&job, checkin, checkout).await;
            (job.country, offers)
        }))
        .buffer_unordered(self.config.max_concurrent_fetches.max(1));
        tokio::pin!(fetch_stream);

        let deadline = self
            .config
            .run_deadline_secs
            .map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

        let mut completed: Vec<(String, Vec<Offer>)> = Vec::new();
        let mut cancelled = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, fetch_stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        cancelled = true;
                        break;
                    }
                },
                None => fetch_stream.next().await,
            };
            match next {
                Some(item) => completed.push(item),
                None => break,
            }
        }

        if cancelled {
            warn!(
                completed = completed.len(),
                "Run deadline reached, abandoning in-flight fetches"
            );
            if completed.is_empty() {
                return Err(ScanError::Cancelled.into());
            }
        }

        Ok(completed)
    }

    /// One (destination, vendor) fetch through the cache. Vendor failures
    /// and timeouts are absorbed here as zero offers.
    async fn fetch_offers(
        &self,
        job: &FetchJob<'_>,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Vec<Offer> {
        let filters = self.filters.price_filters();

        let Some(cache) = &self.cache else {
            return self.call_vendor(job, checkin, checkout, &filters).await;
        };

        let key = CacheKey::for_search(
            job.vendor.name(),
            &job.destination.vendor_id(job.vendor.name()),
            checkin,
            checkout,
            filters.min_price,
            filters.max_price,
        );

        // Coalesce concurrent fetches for the same query.
        let lock = cache.fetch_lock(&key);
        let _guard = lock.lock().await;

        if let Some(payload) = cache.get(&key) {
            match serde_json::from_value::<Vec<Offer>>(payload) {
                Ok(offers) => {
                    debug!(
                        vendor = job.vendor.name(),
                        city = %job.destination.city_name,
                        offers = offers.len(),
                        "Cache hit"
                    );
                    return offers;
                }
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "Cache payload unreadable, refetching");
                }
            }
        }

        let offers = self.call_vendor(job, checkin, checkout, &filters).await;
        match serde_json::to_value(&offers) {
            Ok(payload) => cache.set(&key, &payload),
            Err(e) => warn!(error = %e, "Failed to serialise offers for cache"),
        }
        offers
    }

    async fn call_vendor(
        &self,
        job: &FetchJob<'_>,
        checkin: NaiveDate,
        checkout: NaiveDate,
        filters: &PriceFilters,
    ) -> Vec<Offer> {
        let timeout = Duration::from_secs(self.config.vendor_timeout_secs);
        let call = job
            .vendor
            .search(job.destination, checkin, checkout, filters, job.limit);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(offers)) => offers,
            Ok(Err(e)) => {
                warn!(
                    vendor = job.vendor.name(),
                    city = %job.destination.city_name,
                    error = %e,
                    "Vendor call failed, continuing with zero offers"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    vendor = job.vendor.name(),
                    city = %job.destination.city_name,
                    timeout_secs = self.config.vendor_timeout_secs,
                    "Vendor call timed out, continuing with zero offers"
                );
                Vec::new()
            }
        }
    }

    // -- Statistics ------------------------------------------------------

    fn country_metrics(
        &self,
        code: &str,
        name: &str,
        ci: f64,
        offers: &[PricedOffer],
    ) -> CountryMetrics {
        if offers.is_empty() {
            return CountryMetrics::empty(code, name, ci, &self.config.base_currency);
        }

        let mut prices: Vec<f64> = offers.iter().map(|p| p.price_base).collect();
        prices.sort_by(f64::total_cmp);
        let n = prices.len();

        let min = prices[0];
        let median = sorted_median(&prices).unwrap_or(min);
        let p90 = prices[p90_index(n)];

        let mut high_rating: Vec<f64> = offers
            .iter()
            .filter(|p| {
                p.offer
                    .rating
                    .is_some_and(|r| r >= self.filters.high_rating_floor)
            })
            .map(|p| p.price_base)
            .collect();
        high_rating.sort_by(f64::total_cmp);

        let mut starred: Vec<f64> = offers
            .iter()
            .filter(|p| p.offer.stars.is_some_and(|s| s >= self.filters.stars_floor))
            .map(|p| p.price_base)
            .collect();
        starred.sort_by(f64::total_cmp);

        let alpha = self.config.alpha;
        CountryMetrics {
            country_code: code.to_string(),
            country_name: name.to_string(),
            cost_index: ci,
            currency: self.config.base_currency.clone(),
            min_price: Some(min),
            median_price: Some(median),
            p90_price: Some(p90),
            effective_min: Some(effective_price(min, ci, alpha)),
            effective_median: Some(effective_price(median, ci, alpha)),
            median_high_rating: sorted_median(&high_rating),
            median_three_stars: sorted_median(&starred),
            offer_count: n as u32,
            offer_count_high_rating: high_rating.len() as u32,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn validate_cost_index(cost_index: &HashMap<String, f64>) -> Result<(), ScanError> {
    for (code, &ci) in cost_index {
        if !ci.is_finite() || ci < 1.0 {
            return Err(ScanError::Config(format!(
                "cost index for {code} must be a finite number >= 1.0, got {ci}"
            )));
        }
    }
    Ok(())
}

fn validate_weights(weights: &HashMap<String, f64>) -> Result<(), ScanError> {
    for (code, &w) in weights {
        if !w.is_finite() {
            return Err(ScanError::Config(format!(
                "scan weight for {code} must be finite, got {w}"
            )));
        }
    }
    Ok(())
}

/// Soft dedupe: one survivor per (city, hotel) key, always the cheapest in
/// base currency. Different hotels sharing a name do collapse, which is
/// acceptable for aggregate country statistics.
fn dedupe_cheapest(offers: Vec<PricedOffer>) -> Vec<PricedOffer> {
    let mut best: HashMap<(String, String), PricedOffer> = HashMap::new();
    for priced in offers {
        let key = priced.offer.dedupe_key();
        match best.get(&key) {
            Some(existing) if existing.price_base <= priced.price_base => {}
            _ => {
                best.insert(key, priced);
            }
        }
    }
    best.into_values().collect()
}

/// Median of an ascending-sorted slice; mean of the middle pair for even n.
fn sorted_median(prices: &[f64]) -> Option<f64> {
    let n = prices.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(prices[n / 2])
    } else {
        Some((prices[n / 2 - 1] + prices[n / 2]) / 2.0)
    }
}

/// Index of the 90th-percentile element in an ascending-sorted slice.
fn p90_index(n: usize) -> usize {
    ((n as f64 * 0.9) as usize).saturating_sub(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
