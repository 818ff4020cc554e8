//! Hybrid trade scorer.
//!
//! Blends the model's positive-class probability with the conviction score
//! and subtracts the assignment risk penalty:
//!
//! `final = 0.7 * p + 0.3 * (conviction / 100) - penalty`
//!
//! Every call emits exactly one audit line through the scorer's sink.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audit::{AuditSink, TracingSink};
use crate::data::{FeatureSet, Side, Trade};

use super::conviction::{ConvictionResult, ConvictionScorer};
use super::provider::{positive_class_probability, ProbabilityProvider};
use super::risk::RiskAdjuster;

pub const ML_WEIGHT: f64 = 0.7;
pub const CONVICTION_WEIGHT: f64 = 0.3;

/// Full breakdown of one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrade {
    pub trade: Trade,
    pub side: Side,
    pub premium: Decimal,
    pub ml_probability: f64,
    pub conviction: ConvictionResult,
    pub risk_penalty: f64,
    pub final_score: f64,
}

impl ScoredTrade {
    /// Score before the risk penalty.
    pub fn blended_score(&self) -> f64 {
        ML_WEIGHT * self.ml_probability + CONVICTION_WEIGHT * (self.conviction.score / 100.0)
    }
}

/// Audit payload for one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAudit {
    pub symbol: String,
    pub side: Side,
    pub strike: Decimal,
    pub expiry: Option<NaiveDate>,
    pub delta: f64,
    pub premium: Decimal,
    pub ml_score: f64,
    pub conviction_score: f64,
    pub final_score: f64,
}

impl From<&ScoredTrade> for ScoreAudit {
    fn from(scored: &ScoredTrade) -> Self {
        Self {
            symbol: scored.trade.symbol.clone(),
            side: scored.side,
            strike: scored.trade.strike,
            expiry: scored.trade.expiry,
            delta: scored.trade.delta,
            premium: scored.premium,
            ml_score: scored.ml_probability,
            conviction_score: scored.conviction.score,
            final_score: scored.final_score,
        }
    }
}

impl fmt::Display for ScoreAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expiry = self
            .expiry
            .map(|e| e.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        write!(
            f,
            "[TradeScorer] {} trade for {} | Strike={}, Expiry={}, Delta={:.2}, Premium={:.2}, \
             ML Score={:.3}, Conviction={:.2}, Final Adjusted Score={:.3}",
            self.side,
            self.symbol,
            self.strike,
            expiry,
            self.delta,
            self.premium,
            self.ml_score,
            self.conviction_score,
            self.final_score
        )
    }
}

/// Scores candidate trades for one symbol.
///
/// Cheap to clone: the provider and sink are shared.
#[derive(Clone)]
pub struct TradeScorer {
    symbol: String,
    provider: Option<Arc<dyn ProbabilityProvider>>,
    conviction: ConvictionScorer,
    risk: RiskAdjuster,
    sink: Arc<dyn AuditSink>,
}

impl TradeScorer {
    /// Scorer with default conviction weights, default risk settings and no
    /// model (every ML probability is 0.0).
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            provider: None,
            conviction: ConvictionScorer::default(),
            risk: RiskAdjuster::default(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ProbabilityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_conviction(mut self, conviction: ConvictionScorer) -> Self {
        self.conviction = conviction;
        self
    }

    pub fn with_risk(mut self, risk: RiskAdjuster) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn risk(&self) -> &RiskAdjuster {
        &self.risk
    }

    pub fn sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.sink)
    }

    /// Features always derived from the trade itself.
    pub fn base_features(trade: &Trade, premium: Decimal, side: Side) -> FeatureSet {
        let mut features = FeatureSet::new();
        features.insert("strike".to_string(), trade.strike.try_into().unwrap_or(0.0));
        features.insert("delta".to_string(), trade.delta);
        features.insert("premium".to_string(), premium.try_into().unwrap_or(0.0));
        features.insert("expiry".to_string(), trade.expiry_numeric());
        features.insert("side".to_string(), side.as_binary());
        features
    }

    /// Final adjusted score for a trade.
    pub fn score(
        &self,
        trade: &Trade,
        premium: Decimal,
        side: Side,
        extra_features: Option<&FeatureSet>,
    ) -> f64 {
        self.score_trade(trade, premium, side, extra_features).final_score
    }

    /// Score a trade and return the full breakdown.
    ///
    /// Extra features are merged over the base features, replacing any base
    /// value with the same name.
    pub fn score_trade(
        &self,
        trade: &Trade,
        premium: Decimal,
        side: Side,
        extra_features: Option<&FeatureSet>,
    ) -> ScoredTrade {
        let mut features = Self::base_features(trade, premium, side);
        if let Some(extra) = extra_features {
            features.extend(extra.iter().map(|(k, v)| (k.clone(), *v)));
        }

        let ml_probability = match &self.provider {
            Some(provider) => positive_class_probability(provider.as_ref(), &features),
            None => 0.0,
        };

        let conviction = self.conviction.score(&features);
        if conviction.matched_factors == 0 {
            debug!(
                symbol = %trade.symbol,
                "No conviction factors matched; conviction score is 0"
            );
        }

        let risk_penalty = self.risk.penalty(trade);
        let final_score = ML_WEIGHT * ml_probability
            + CONVICTION_WEIGHT * (conviction.score / 100.0)
            - risk_penalty;

        let scored = ScoredTrade {
            trade: trade.clone(),
            side,
            premium,
            ml_probability,
            conviction,
            risk_penalty,
            final_score,
        };
        self.sink.trade_scored(&ScoreAudit::from(&scored));
        scored
    }

    /// Score on the blocking pool so a slow provider does not stall the
    /// async runtime.
    pub async fn score_trade_async(
        &self,
        trade: Trade,
        premium: Decimal,
        side: Side,
        extra_features: Option<FeatureSet>,
    ) -> Result<ScoredTrade, tokio::task::JoinError> {
        let scorer = self.clone();
        tokio::task::spawn_blocking(move || {
            scorer.score_trade(&trade, premium, side, extra_features.as_ref())
        })
        .await
    }
}
