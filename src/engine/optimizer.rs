//! Scan-weight optimizer.
//!
//! Computes a per-country scan-budget multiplier from the cost-index prior
//! and, when available, historical mispricing. Countries that look cheap —
//! a low prior, or a history of medians below what the prior predicts —
//! earn more scan budget; a `top_k` cut can exclude the rest outright.
//!
//! Scaling: surviving raw scores are mapped linearly so the median score
//! lands on the midpoint of `[min_weight, max_weight]`, then clamped to the
//! range. Monotonic in the raw score; equal bounds collapse every survivor
//! to that single value.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::types::{HistoricalSummaryEntry, ScanError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Optimizer bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Keep only the `top_k` most attractive countries; the rest get
    /// weight 0. `Some(0)` excludes everything (a valid "scan nothing"
    /// configuration); `None` keeps all.
    pub top_k: Option<usize>,
    /// Lower bound for surviving weights. Must be >= 0 and <= `max_weight`.
    pub min_weight: f64,
    /// Upper bound for surviving weights.
    pub max_weight: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            top_k: None,
            min_weight: 0.5,
            max_weight: 2.0,
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<(), ScanError> {
        if !self.min_weight.is_finite() || !self.max_weight.is_finite() {
            return Err(ScanError::Config(
                "optimizer weight bounds must be finite".to_string(),
            ));
        }
        if self.min_weight < 0.0 {
            return Err(ScanError::Config(format!(
                "min_weight must be >= 0, got {}",
                self.min_weight
            )));
        }
        if self.min_weight > self.max_weight {
            return Err(ScanError::Config(format!(
                "min_weight {} exceeds max_weight {}",
                self.min_weight, self.max_weight
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Weight computation
// ---------------------------------------------------------------------------

/// Build per-country scan weights.
///
/// Per country: `raw = 1 / cost_index`, refined to
/// `1 / (cost_index * normalized_median)` when history provides a positive
/// normalized median (a non-positive one counts as missing data). The
/// result maps every country of `cost_index` to a weight; excluded
/// countries carry an explicit 0.
pub fn compute_scan_weights(
    cost_index: &HashMap<String, f64>,
    history: &HashMap<String, HistoricalSummaryEntry>,
    config: &OptimizerConfig,
) -> Result<HashMap<String, f64>, ScanError> {
    config.validate()?;
    validate_cost_index(cost_index)?;

    if cost_index.is_empty() {
        return Ok(HashMap::new());
    }

    // Raw attractiveness scores.
    let mut entries: Vec<(String, f64)> = cost_index
        .iter()
        .map(|(code, &ci)| {
            let normalized_median = history
                .get(code)
                .map(|h| h.normalized_median)
                .filter(|nm| nm.is_finite() && *nm > 0.0);

            let raw = match normalized_median {
                Some(nm) => 1.0 / (ci * nm),
                None => 1.0 / ci,
            };

            debug!(
                country = %code,
                cost_index = ci,
                normalized_median = ?normalized_median,
                raw,
                "Raw scan score"
            );

            (code.clone(), raw)
        })
        .collect();

    // Most attractive first; ties resolved by country code for determinism.
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let cut = match config.top_k {
        Some(k) => k.min(entries.len()),
        None => entries.len(),
    };
    let (kept, excluded) = entries.split_at(cut);

    let mut weights: HashMap<String, f64> = HashMap::with_capacity(entries.len());
    for (code, _) in excluded {
        weights.insert(code.clone(), 0.0);
    }

    if !kept.is_empty() {
        let mut raw_sorted: Vec<f64> = kept.iter().map(|(_, r)| *r).collect();
        raw_sorted.sort_by(f64::total_cmp);
        let median_raw = raw_sorted[raw_sorted.len() / 2];
        let mid = (config.min_weight + config.max_weight) / 2.0;

        for (code, raw) in kept {
            let scaled = (mid * raw / median_raw).clamp(config.min_weight, config.max_weight);
            weights.insert(code.clone(), scaled);
        }
    }

    Ok(weights)
}

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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn index(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(c, v)| (c.to_string(), *v)).collect()
    }

    fn summary(code: &str, cost_index: f64, normalized_median: f64) -> HistoricalSummaryEntry {
        HistoricalSummaryEntry {
            country_code: code.to_string(),
            country_name: code.to_string(),
            cost_index,
            avg_median_price: normalized_median * cost_index,
            avg_effective_median: normalized_median * cost_index * cost_index,
            normalized_median,
        }
    }

    // -- Ordering properties --

    #[test]
    fn test_cheaper_country_gets_higher_weight() {
        let ci = index(&[("BG", 1.0), ("DK", 2.0)]);
        let mut history = HashMap::new();
        history.insert("BG".to_string(), summary("BG", 1.0, 50.0));
        history.insert("DK".to_string(), summary("DK", 2.0, 100.0));

        let weights =
            compute_scan_weights(&ci, &history, &OptimizerConfig::default()).unwrap();
        assert!(weights["BG"] > weights["DK"]);
    }

    #[test]
    fn test_no_history_falls_back_to_prior() {
        let ci = index(&[("BG", 1.0), ("DK", 2.0)]);
        let weights =
            compute_scan_weights(&ci, &HashMap::new(), &OptimizerConfig::default()).unwrap();
        assert!(weights["BG"] > weights["DK"]);
    }

    #[test]
    fn test_equal_history_smaller_index_wins() {
        let ci = index(&[("A", 1.2), ("B", 1.6)]);
        let mut history = HashMap::new();
        history.insert("A".to_string(), summary("A", 1.2, 40.0));
        history.insert("B".to_string(), summary("B", 1.6, 40.0));

        let weights =
            compute_scan_weights(&ci, &history, &OptimizerConfig::default()).unwrap();
        assert!(weights["A"] >= weights["B"]);
    }

    #[test]
    fn test_nonpositive_normalized_median_treated_as_missing() {
        let ci = index(&[("A", 1.0), ("B", 1.0)]);
        let mut history = HashMap::new();
        history.insert("A".to_string(), summary("A", 1.0, 0.0));
        history.insert("B".to_string(), summary("B", 1.0, -3.0));

        // Both fall back to 1/ci; equal weights, no division by zero.
        let weights =
            compute_scan_weights(&ci, &history, &OptimizerConfig::default()).unwrap();
        assert!((weights["A"] - weights["B"]).abs() < 1e-12);
    }

    // -- top_k behaviour --

    #[test]
    fn test_top_k_limits_non_zero_countries() {
        let ci = index(&[("BG", 1.0), ("RO", 1.1), ("PT", 1.3), ("DK", 2.2)]);
        let config = OptimizerConfig {
            top_k: Some(2),
            ..OptimizerConfig::default()
        };

        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        assert_eq!(weights.len(), 4);
        let non_zero: Vec<_> = weights.iter().filter(|(_, w)| **w > 0.0).collect();
        assert_eq!(non_zero.len(), 2);
        // The two cheapest priors survive.
        assert!(weights["BG"] > 0.0);
        assert!(weights["RO"] > 0.0);
        assert_eq!(weights["PT"], 0.0);
        assert_eq!(weights["DK"], 0.0);
    }

    #[test]
    fn test_top_k_zero_excludes_everything() {
        let ci = index(&[("BG", 1.0), ("DK", 2.0)]);
        let config = OptimizerConfig {
            top_k: Some(0),
            ..OptimizerConfig::default()
        };

        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        assert_eq!(weights.len(), 2);
        assert!(weights.values().all(|w| *w == 0.0));
    }

    #[test]
    fn test_top_k_at_least_count_is_no_filter() {
        let ci = index(&[("BG", 1.0), ("RO", 1.1), ("DK", 2.2)]);
        let unfiltered =
            compute_scan_weights(&ci, &HashMap::new(), &OptimizerConfig::default()).unwrap();
        let with_large_k = compute_scan_weights(
            &ci,
            &HashMap::new(),
            &OptimizerConfig {
                top_k: Some(3),
                ..OptimizerConfig::default()
            },
        )
        .unwrap();
        let with_huge_k = compute_scan_weights(
            &ci,
            &HashMap::new(),
            &OptimizerConfig {
                top_k: Some(50),
                ..OptimizerConfig::default()
            },
        )
        .unwrap();

        for code in ci.keys() {
            assert!((unfiltered[code] - with_large_k[code]).abs() < 1e-12);
            assert!((unfiltered[code] - with_huge_k[code]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tie_break_is_alphabetical() {
        // Identical raw scores: the alphabetically earlier code survives a
        // top_k cut.
        let ci = index(&[("BB", 1.5), ("AA", 1.5)]);
        let config = OptimizerConfig {
            top_k: Some(1),
            ..OptimizerConfig::default()
        };

        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        assert!(weights["AA"] > 0.0);
        assert_eq!(weights["BB"], 0.0);
    }

    // -- Scaling --

    #[test]
    fn test_median_maps_to_midpoint() {
        // raw scores: 1.0, 0.5, 0.25 → ascending median is 0.5 (index 1).
        let ci = index(&[("A", 1.0), ("B", 2.0), ("C", 4.0)]);
        let config = OptimizerConfig {
            top_k: None,
            min_weight: 0.5,
            max_weight: 2.0,
        };

        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        // Midpoint is 1.25; B sits exactly on the median.
        assert!((weights["B"] - 1.25).abs() < 1e-9);
        // A would scale to 2.5 but clamps to the upper bound.
        assert!((weights["A"] - 2.0).abs() < 1e-9);
        // C scales to 1.25 * 0.5 = 0.625, inside the range.
        assert!((weights["C"] - 0.625).abs() < 1e-9);
    }

    #[test]
    fn test_equal_bounds_collapse_survivors() {
        let ci = index(&[("A", 1.0), ("B", 2.0), ("C", 4.0)]);
        let config = OptimizerConfig {
            top_k: Some(2),
            min_weight: 1.0,
            max_weight: 1.0,
        };

        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        assert_eq!(weights["A"], 1.0);
        assert_eq!(weights["B"], 1.0);
        assert_eq!(weights["C"], 0.0);
    }

    #[test]
    fn test_weights_monotone_in_raw_score() {
        let ci = index(&[("A", 1.0), ("B", 1.2), ("C", 1.5), ("D", 1.9), ("E", 2.4)]);
        let weights =
            compute_scan_weights(&ci, &HashMap::new(), &OptimizerConfig::default()).unwrap();
        assert!(weights["A"] >= weights["B"]);
        assert!(weights["B"] >= weights["C"]);
        assert!(weights["C"] >= weights["D"]);
        assert!(weights["D"] >= weights["E"]);
    }

    // -- Validation --

    #[test]
    fn test_inverted_bounds_are_a_config_error() {
        let ci = index(&[("A", 1.0)]);
        let config = OptimizerConfig {
            top_k: None,
            min_weight: 2.0,
            max_weight: 0.5,
        };
        let err = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_negative_min_weight_rejected() {
        let ci = index(&[("A", 1.0)]);
        let config = OptimizerConfig {
            top_k: None,
            min_weight: -0.5,
            max_weight: 2.0,
        };
        assert!(compute_scan_weights(&ci, &HashMap::new(), &config).is_err());
    }

    #[test]
    fn test_invalid_cost_index_rejected() {
        for bad in [0.5, 0.0, -1.0, f64::NAN, f64::INFINITY] {
            let ci = index(&[("A", bad), ("B", 1.0)]);
            let err = compute_scan_weights(&ci, &HashMap::new(), &OptimizerConfig::default())
                .unwrap_err();
            assert!(matches!(err, ScanError::Config(_)), "ci={bad} accepted");
        }
    }

    #[test]
    fn test_empty_cost_index_yields_empty_weights() {
        let weights = compute_scan_weights(
            &HashMap::new(),
            &HashMap::new(),
            &OptimizerConfig::default(),
        )
        .unwrap();
        assert!(weights.is_empty());
    }

    #[test]
    fn test_every_input_country_present() {
        let ci = index(&[("A", 1.0), ("B", 1.5), ("C", 3.0)]);
        let config = OptimizerConfig {
            top_k: Some(1),
            ..OptimizerConfig::default()
        };
        let weights = compute_scan_weights(&ci, &HashMap::new(), &config).unwrap();
        assert_eq!(weights.len(), 3);
        for code in ci.keys() {
            assert!(weights.contains_key(code));
        }
    }
}
