//! Probability providers.
//!
//! A provider maps a feature matrix to per-row `[P(negative), P(positive)]`
//! pairs. Scoring only ever uses the positive-class probability, and a
//! provider failure is never fatal: it is logged and treated as 0.0.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::data::{FeatureMatrix, FeatureSet};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Missing feature: {0}")]
    MissingFeature(String),

    #[error("Expected {expected} probability rows, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Prediction failed: {0}")]
    Failed(String),
}

/// Anything that can produce class probabilities for a feature matrix.
pub trait ProbabilityProvider: Send + Sync {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError>;
}

/// Call the provider, turning a panic into an error.
fn guarded_predict(
    provider: &dyn ProbabilityProvider,
    matrix: &FeatureMatrix,
) -> Result<Vec<[f64; 2]>, ProviderError> {
    let rows = panic::catch_unwind(AssertUnwindSafe(|| provider.predict_proba(matrix)))
        .map_err(|_| ProviderError::Failed("provider panicked".to_string()))??;

    if rows.len() != matrix.len() {
        return Err(ProviderError::Shape {
            expected: matrix.len(),
            actual: rows.len(),
        });
    }
    Ok(rows)
}

fn sanitize(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Positive-class probability for a single feature set. 0.0 on failure.
pub fn positive_class_probability(provider: &dyn ProbabilityProvider, features: &FeatureSet) -> f64 {
    let matrix = FeatureMatrix::from_features(features);
    match guarded_predict(provider, &matrix) {
        Ok(rows) => rows.first().map(|row| sanitize(row[1])).unwrap_or(0.0),
        Err(e) => {
            error!("[TradeScorer] ML prediction failed: {}", e);
            0.0
        }
    }
}

/// Positive-class probability for every row. `None` when the provider fails.
pub fn positive_class_probabilities(
    provider: &dyn ProbabilityProvider,
    matrix: &FeatureMatrix,
) -> Option<Vec<f64>> {
    match guarded_predict(provider, matrix) {
        Ok(rows) => Some(rows.iter().map(|row| sanitize(row[1])).collect()),
        Err(e) => {
            error!(rows = matrix.len(), "Signal model prediction failed: {}", e);
            None
        }
    }
}

/// Same probability for every row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantProbability(pub f64);

impl ProbabilityProvider for ConstantProbability {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
        let p = self.0.clamp(0.0, 1.0);
        Ok(vec![[1.0 - p, p]; features.len()])
    }
}

/// Reads a precomputed probability from a named feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProbability {
    pub column: String,
}

impl ColumnProbability {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
        }
    }
}

impl ProbabilityProvider for ColumnProbability {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
        let idx = features
            .column_index(&self.column)
            .ok_or_else(|| ProviderError::MissingFeature(self.column.clone()))?;

        Ok(features
            .rows
            .iter()
            .map(|row| {
                let p = sanitize(row[idx]);
                [1.0 - p, p]
            })
            .collect())
    }
}

/// Linear logit over named features. Features without a coefficient are
/// ignored; a coefficient whose feature is absent contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

impl LogisticModel {
    pub fn new(intercept: f64) -> Self {
        Self {
            intercept,
            coefficients: BTreeMap::new(),
        }
    }

    pub fn coefficient(mut self, feature: &str, weight: f64) -> Self {
        self.coefficients.insert(feature.to_string(), weight);
        self
    }
}

impl ProbabilityProvider for LogisticModel {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
        let weights: Vec<(usize, f64)> = self
            .coefficients
            .iter()
            .filter_map(|(name, w)| features.column_index(name).map(|i| (i, *w)))
            .collect();

        Ok(features
            .rows
            .iter()
            .map(|row| {
                let z = self.intercept + weights.iter().map(|(i, w)| row[*i] * w).sum::<f64>();
                let p = 1.0 / (1.0 + (-z).exp());
                [1.0 - p, p]
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl ProbabilityProvider for Failing {
        fn predict_proba(&self, _: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
            Err(ProviderError::Failed("model not fitted".to_string()))
        }
    }

    struct Panicking;

    impl ProbabilityProvider for Panicking {
        fn predict_proba(&self, _: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
            panic!("boom")
        }
    }

    struct Empty;

    impl ProbabilityProvider for Empty {
        fn predict_proba(&self, _: &FeatureMatrix) -> Result<Vec<[f64; 2]>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn features(pairs: &[(&str, f64)]) -> FeatureSet {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_failures_yield_zero() {
        let f = features(&[("delta", 0.3)]);
        assert_eq!(positive_class_probability(&Failing, &f), 0.0);
        assert_eq!(positive_class_probability(&Panicking, &f), 0.0);
        assert_eq!(positive_class_probability(&Empty, &f), 0.0);
    }

    #[test]
    fn test_constant_clamped() {
        let f = features(&[("delta", 0.3)]);
        assert_eq!(positive_class_probability(&ConstantProbability(0.8), &f), 0.8);
        assert_eq!(positive_class_probability(&ConstantProbability(1.7), &f), 1.0);
    }

    #[test]
    fn test_column_probability() {
        let provider = ColumnProbability::new("probability");
        let f = features(&[("probability", 0.65), ("price", 100.0)]);
        assert_eq!(positive_class_probability(&provider, &f), 0.65);

        let missing = features(&[("price", 100.0)]);
        assert_eq!(positive_class_probability(&provider, &missing), 0.0);
    }

    #[test]
    fn test_logistic_model() {
        let model = LogisticModel::new(0.0).coefficient("x", 1.0);
        let zero = features(&[("x", 0.0)]);
        assert!((positive_class_probability(&model, &zero) - 0.5).abs() < 1e-12);

        let high = features(&[("x", 5.0), ("unused", 100.0)]);
        assert!(positive_class_probability(&model, &high) > 0.99);
    }

    #[test]
    fn test_batch_probabilities() {
        let rows = [features(&[("probability", 0.2)]), features(&[("probability", 0.9)])];
        let matrix = FeatureMatrix::from_rows(rows.iter());

        let probs = positive_class_probabilities(&ColumnProbability::new("probability"), &matrix);
        assert_eq!(probs, Some(vec![0.2, 0.9]));
        assert_eq!(positive_class_probabilities(&Failing, &matrix), None);
        assert_eq!(positive_class_probabilities(&Empty, &matrix), None);
    }
}
