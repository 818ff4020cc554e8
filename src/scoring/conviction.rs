//! Rule-weighted conviction scoring.
//!
//! Only factors present in both the feature set and the weight table count:
//! a feature without a weight neither adds to the score nor to the total
//! weight used for normalisation. The score is scaled to 0-100 and rounded
//! to two decimals. Override rules are evaluated afterwards, in order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::FeatureSet;

/// Threshold used by override rules that do not set one.
pub const DEFAULT_OVERRIDE_THRESHOLD: f64 = 90.0;

/// Factor name to non-negative weight. Weights need not sum to 1.
pub type WeightTable = HashMap<String, f64>;

/// Flags a rule name when the conviction score reaches its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    pub name: String,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl OverrideRule {
    pub fn new(name: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            threshold: Some(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_OVERRIDE_THRESHOLD)
    }
}

/// Result of conviction scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvictionResult {
    /// 0-100, two decimals.
    pub score: f64,
    /// Triggered override rules, in rule order.
    pub overrides: Vec<String>,
    /// Number of features that had a weight.
    pub matched_factors: usize,
}

/// Score a feature set against a weight table and override rules.
pub fn compute_conviction_score(
    features: &FeatureSet,
    weights: &WeightTable,
    overrides: &[OverrideRule],
) -> ConvictionResult {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut matched_factors = 0;

    for (factor, value) in features {
        if let Some(weight) = weights.get(factor) {
            weighted += value * weight;
            total_weight += weight;
            matched_factors += 1;
        }
    }

    let score = if total_weight > 0.0 {
        round2(weighted / total_weight * 100.0)
    } else {
        0.0
    };

    let overrides = overrides
        .iter()
        .filter(|rule| score >= rule.threshold())
        .map(|rule| rule.name.clone())
        .collect();

    ConvictionResult {
        score,
        overrides,
        matched_factors,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Default factor weights for the premium-selling strategy.
pub fn default_weights() -> WeightTable {
    [
        ("DTE", 0.15),
        ("Strike Distance", 0.15),
        ("Premium Yield", 0.15),
        ("Delta", 0.10),
        ("IV Rank", 0.10),
        ("RSI", 0.10),
        ("Earnings Proximity", 0.10),
        ("Cost Basis Awareness", 0.10),
        ("Sizing", 0.05),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Default override rules.
pub fn default_overrides() -> Vec<OverrideRule> {
    vec![
        OverrideRule::new("sizing", 90.0),
        OverrideRule::new("strike_distance", 92.0),
        OverrideRule::new("premium_yield", 95.0),
    ]
}

/// Conviction scorer bound to a weight table and override rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvictionScorer {
    weights: WeightTable,
    overrides: Vec<OverrideRule>,
}

impl ConvictionScorer {
    pub fn new(weights: WeightTable, overrides: Vec<OverrideRule>) -> Self {
        Self { weights, overrides }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn overrides(&self) -> &[OverrideRule] {
        &self.overrides
    }

    pub fn score(&self, features: &FeatureSet) -> ConvictionResult {
        compute_conviction_score(features, &self.weights, &self.overrides)
    }
}

impl Default for ConvictionScorer {
    fn default() -> Self {
        Self::new(default_weights(), default_overrides())
    }
}
