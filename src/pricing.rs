//! Currency conversion and cost-adjusted pricing.
//!
//! Conversion uses a static rate table anchored on a reference currency
//! (each entry is "reference units per 1 unit of that currency") and pivots
//! through the reference. Unknown codes are hard errors — the aggregator
//! drops the offending offer rather than pretending it was converted.

use std::collections::HashMap;

use crate::types::ScanError;

/// Static FX rate table.
///
/// Keys are upper-cased ISO currency codes; values are reference-currency
/// units per 1 unit of the keyed currency. The reference itself (usually
/// EUR) must be present with a rate of 1.0 for pivoted conversions to
/// resolve.
#[derive(Debug, Clone)]
pub struct FxTable {
    rates: HashMap<String, f64>,
}

impl FxTable {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();
        Self { rates }
    }

    /// Whether a currency code is known to the table.
    pub fn knows(&self, code: &str) -> bool {
        self.rates.contains_key(&code.to_uppercase())
    }

    /// Convert `amount` between two currencies.
    ///
    /// A same-currency conversion short-circuits without consulting the
    /// table. Either code being absent fails with
    /// [`ScanError::UnknownCurrency`].
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, ScanError> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(amount);
        }

        let rate_from = self
            .rates
            .get(&from)
            .ok_or_else(|| ScanError::UnknownCurrency(from.clone()))?;
        let rate_to = self
            .rates
            .get(&to)
            .ok_or_else(|| ScanError::UnknownCurrency(to.clone()))?;

        Ok(amount * rate_from / rate_to)
    }
}

/// Price adjusted by the country's cost-index prior.
///
/// With `alpha = 0` the prior is ignored; with `alpha = 1` a country twice
/// as expensive as the reference doubles its effective price. Monotonically
/// non-decreasing in `cost_index` for any `alpha >= 0`.
pub fn effective_price(price: f64, cost_index: f64, alpha: f64) -> f64 {
    price * cost_index.powf(alpha)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
