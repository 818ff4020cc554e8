//! Risk adjustment and capital allocation.
//!
//! Penalizes trades whose assignment capital exceeds the deployable budget:
//! - Allowed capital: available capital less a safety buffer
//! - Penalty: `max(0, (required - allowed) / allowed) * 10`
//! - Allocation: fixed fraction of available capital per trade

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Trade;

/// Multiplier applied to the capital overrun ratio.
pub const PENALTY_SCALE: f64 = 10.0;

/// Risk adjuster configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Capital available for new positions.
    pub available_capital: f64,
    /// Fraction of capital held back from allocation (0.2 = 20%).
    pub capital_buffer: f64,
    /// Fraction of available capital allocated per trade.
    pub max_allocation_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            available_capital: 100_000.0,
            capital_buffer: 0.2,
            max_allocation_pct: 0.1,
        }
    }
}

/// Score adjustment for a single trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvaluation {
    pub trade: Trade,
    /// Score before the penalty.
    pub base_score: f64,
    /// `base_score - penalty`.
    pub adjusted_score: f64,
    /// Capital allocated to the trade.
    pub allocation_size: f64,
}

/// Assignment risk penalty for a trade.
///
/// # Arguments
/// * `trade` - Candidate trade (assignment capital defaults to `strike * 100`)
/// * `available_capital` - Capital available for new positions
/// * `capital_buffer` - Fraction of capital held back
///
/// # Returns
/// * Non-negative penalty. Zero when the trade fits within allowed capital,
///   positive infinity when no capital is allowed at all.
pub fn assignment_risk_penalty(trade: &Trade, available_capital: f64, capital_buffer: f64) -> f64 {
    let required: f64 = trade.capital_required().try_into().unwrap_or(0.0);
    let allowed = available_capital * (1.0 - capital_buffer);

    if allowed <= 0.0 {
        return if required > 0.0 { f64::INFINITY } else { 0.0 };
    }

    let overrun = (required - allowed) / allowed;
    overrun.max(0.0) * PENALTY_SCALE
}

/// Capital allocated to a single trade.
pub fn compute_allocation_size(available_capital: f64, max_allocation_pct: f64) -> f64 {
    available_capital * max_allocation_pct
}

/// Risk adjuster bound to a capital configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskAdjuster {
    config: RiskConfig,
}

impl RiskAdjuster {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Adjuster with the given capital and default buffer/allocation.
    pub fn with_capital(available_capital: f64) -> Self {
        Self::new(RiskConfig {
            available_capital,
            ..RiskConfig::default()
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Capital that can be committed after the buffer.
    pub fn allowed_capital(&self) -> f64 {
        self.config.available_capital * (1.0 - self.config.capital_buffer)
    }

    pub fn penalty(&self, trade: &Trade) -> f64 {
        assignment_risk_penalty(trade, self.config.available_capital, self.config.capital_buffer)
    }

    /// `base_score` less the assignment risk penalty.
    pub fn adjust_score(&self, base_score: f64, trade: &Trade) -> f64 {
        base_score - self.penalty(trade)
    }

    pub fn allocation_size(&self) -> f64 {
        compute_allocation_size(self.config.available_capital, self.config.max_allocation_pct)
    }

    /// Adjust a batch of scored trades. Output order matches input order.
    pub fn evaluate_trades(&self, scored: &[(Trade, f64)]) -> Vec<TradeEvaluation> {
        let allocation_size = self.allocation_size();
        scored
            .iter()
            .map(|(trade, base_score)| TradeEvaluation {
                trade: trade.clone(),
                base_score: *base_score,
                adjusted_score: self.adjust_score(*base_score, trade),
                allocation_size,
            })
            .collect()
    }

    /// Whole contracts an allocation can cover.
    ///
    /// # Arguments
    /// * `allocation` - Capital allocated to the trade
    /// * `capital_per_contract` - Assignment capital for one contract
    pub fn contracts_for_allocation(allocation: f64, capital_per_contract: Decimal) -> u32 {
        let per_contract: f64 = capital_per_contract.try_into().unwrap_or(0.0);
        if per_contract <= 0.0 || allocation <= 0.0 {
            return 0;
        }
        (allocation / per_contract).floor() as u32
    }
}
