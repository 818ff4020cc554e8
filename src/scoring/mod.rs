//! Trade scoring.
//!
//! - Conviction: weighted factor score with override flags
//! - Risk: assignment capital penalty and allocation sizing
//! - Providers: pluggable probability models
//! - Scorer: hybrid blend of model probability, conviction and risk

pub mod conviction;
pub mod features;
pub mod provider;
pub mod risk;
pub mod scorer;

pub use conviction::{
    compute_conviction_score, default_overrides, default_weights, ConvictionResult,
    ConvictionScorer, OverrideRule, WeightTable,
};
pub use features::{market_factors, FactorInputs, MARKET_FACTORS};
pub use provider::{
    positive_class_probabilities, positive_class_probability, ColumnProbability,
    ConstantProbability, LogisticModel, ProbabilityProvider, ProviderError,
};
pub use risk::{
    assignment_risk_penalty, compute_allocation_size, RiskAdjuster, RiskConfig, TradeEvaluation,
};
pub use scorer::{ScoreAudit, ScoredTrade, TradeScorer, CONVICTION_WEIGHT, ML_WEIGHT};
