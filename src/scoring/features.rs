//! Conviction factor inputs.
//!
//! Grades raw trade/market observations into the 0.0 / 0.5 / 1.0 factor
//! values the default conviction weights expect, plus the small indicator
//! helpers (RSI, volatility rank, annualized return on capital) used to
//! produce those observations.

use chrono::NaiveDate;
use statrs::statistics::Statistics;

use crate::data::{FeatureSet, Trade, SHARES_PER_CONTRACT};

pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_RANK_WINDOW: usize = 21;
const TRADING_DAYS: f64 = 252.0;

/// Factors that can be graded from price history alone.
pub const MARKET_FACTORS: [&str; 3] = ["IV Rank", "RSI", "Sizing"];

/// Raw observations for one candidate trade.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorInputs {
    pub dte: i64,
    /// |strike - underlying| / underlying.
    pub strike_distance: f64,
    /// Premium / strike.
    pub premium_yield: f64,
    pub delta: f64,
    /// 0-100.
    pub iv_rank: f64,
    /// 0-100.
    pub rsi: f64,
    pub near_earnings: bool,
    pub above_cost_basis: bool,
    pub contracts: u32,
}

impl Default for FactorInputs {
    fn default() -> Self {
        Self {
            dte: 0,
            strike_distance: 0.0,
            premium_yield: 0.0,
            delta: 0.0,
            iv_rank: 50.0,
            rsi: 50.0,
            near_earnings: false,
            above_cost_basis: true,
            contracts: 1,
        }
    }
}

/// 1.0 inside `best`, 0.5 inside `fair`, 0.0 otherwise (bounds inclusive).
fn band(value: f64, best: (f64, f64), fair: (f64, f64)) -> f64 {
    if value >= best.0 && value <= best.1 {
        1.0
    } else if value >= fair.0 && value <= fair.1 {
        0.5
    } else {
        0.0
    }
}

impl FactorInputs {
    /// Observations carried by the trade itself, as of `as_of`. Market
    /// inputs keep their neutral defaults.
    pub fn from_trade(trade: &Trade, as_of: NaiveDate) -> Self {
        let strike: f64 = trade.strike.try_into().unwrap_or(0.0);
        let underlying: f64 = trade.underlying_price.try_into().unwrap_or(0.0);
        let premium: f64 = trade.premium.try_into().unwrap_or(0.0);

        Self {
            dte: trade.dte(as_of).unwrap_or(0),
            strike_distance: if underlying > 0.0 {
                (strike - underlying).abs() / underlying
            } else {
                0.0
            },
            premium_yield: if strike > 0.0 { premium / strike } else { 0.0 },
            delta: trade.delta,
            contracts: trade.quantity,
            ..Self::default()
        }
    }

    /// Graded factor values keyed by the default conviction weight names.
    pub fn to_features(&self) -> FeatureSet {
        let dte = if (5..=21).contains(&self.dte) {
            1.0
        } else if (0..=35).contains(&self.dte) {
            0.5
        } else {
            0.0
        };

        let premium_yield = if self.premium_yield >= 0.015 {
            1.0
        } else if self.premium_yield >= 0.01 {
            0.5
        } else {
            0.0
        };

        let graded = [
            ("DTE", dte),
            ("Strike Distance", band(self.strike_distance, (0.15, 0.25), (0.10, 0.30))),
            ("Premium Yield", premium_yield),
            // Short-put delta; positive deltas grade 0.
            ("Delta", band(self.delta, (-0.30, -0.10), (-0.35, -0.05))),
            ("IV Rank", band(self.iv_rank, (50.0, 80.0), (40.0, 90.0))),
            ("RSI", band(self.rsi, (40.0, 60.0), (30.0, 70.0))),
            ("Earnings Proximity", if self.near_earnings { 0.0 } else { 1.0 }),
            ("Cost Basis Awareness", if self.above_cost_basis { 1.0 } else { 0.5 }),
            ("Sizing", if self.contracts <= 2 { 1.0 } else { 0.5 }),
        ];

        graded.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// Graded [`MARKET_FACTORS`] from the prices up to and including the entry.
///
/// RSI uses the last [`RSI_PERIOD`] changes; IV rank is the trailing
/// volatility rank scaled to 0-100.
pub fn market_factors(history: &[f64], contracts: u32) -> FeatureSet {
    let recent = &history[history.len().saturating_sub(RSI_PERIOD + 1)..];
    let inputs = FactorInputs {
        rsi: rsi(recent, RSI_PERIOD),
        iv_rank: volatility_rank(history, VOLATILITY_RANK_WINDOW) * 100.0,
        contracts,
        ..FactorInputs::default()
    };

    let mut features = inputs.to_features();
    features.retain(|name, _| MARKET_FACTORS.contains(&name.as_str()));
    features
}

/// Annualized return on assignment capital, rounded to 3 decimals.
/// Zero when `dte` or `strike` is not positive.
pub fn annualized_roc(premium: f64, strike: f64, dte: i64) -> f64 {
    if dte <= 0 || strike <= 0.0 {
        return 0.0;
    }
    let capital = strike * SHARES_PER_CONTRACT as f64;
    let roc = premium * SHARES_PER_CONTRACT as f64 / capital * (365.0 / dte as f64);
    (roc * 1000.0).round() / 1000.0
}

/// RSI over the first `period` price changes. 50.0 (neutral) when there
/// are not enough prices or no movement at all.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let changes: Vec<f64> = prices.windows(2).take(period).map(|w| w[1] - w[0]).collect();
    let gains: f64 = changes.iter().filter(|&&x| x > 0.0).sum();
    let losses: f64 = changes.iter().filter(|&&x| x < 0.0).map(|x| x.abs()).sum();

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss <= 1e-12 {
        return if avg_gain > 0.0 { 100.0 } else { 50.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Percentile rank of the latest rolling annualized volatility among all
/// rolling values, rounded to 2 decimals. 0.5 when the history is too short.
pub fn volatility_rank(prices: &[f64], window: usize) -> f64 {
    if window < 2 || prices.len() < window + 1 {
        return 0.5;
    }

    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let vols: Vec<f64> = returns
        .windows(window)
        .map(|w| w.std_dev() * TRADING_DAYS.sqrt())
        .filter(|v| v.is_finite())
        .collect();

    let Some(current) = vols.last() else {
        return 0.5;
    };
    let below = vols.iter().filter(|v| *v < current).count();
    ((below as f64 / vols.len() as f64) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ideal_inputs_grade_to_one() {
        let inputs = FactorInputs {
            dte: 14,
            strike_distance: 0.2,
            premium_yield: 0.02,
            delta: -0.2,
            iv_rank: 60.0,
            rsi: 50.0,
            near_earnings: false,
            above_cost_basis: true,
            contracts: 1,
        };
        let features = inputs.to_features();
        assert_eq!(features.len(), 9);
        assert!(features.values().all(|v| *v == 1.0));
    }

    #[test]
    fn test_partial_grades() {
        let inputs = FactorInputs {
            dte: 30,
            strike_distance: 0.28,
            premium_yield: 0.012,
            delta: -0.33,
            iv_rank: 85.0,
            rsi: 75.0,
            near_earnings: true,
            above_cost_basis: false,
            contracts: 5,
        };
        let features = inputs.to_features();
        assert_eq!(features["DTE"], 0.5);
        assert_eq!(features["Strike Distance"], 0.5);
        assert_eq!(features["Premium Yield"], 0.5);
        assert_eq!(features["Delta"], 0.5);
        assert_eq!(features["IV Rank"], 0.5);
        assert_eq!(features["RSI"], 0.0);
        assert_eq!(features["Earnings Proximity"], 0.0);
        assert_eq!(features["Cost Basis Awareness"], 0.5);
        assert_eq!(features["Sizing"], 0.5);
    }

    #[test]
    fn test_positive_delta_grades_zero() {
        let inputs = FactorInputs {
            delta: 0.2,
            ..FactorInputs::default()
        };
        assert_eq!(inputs.to_features()["Delta"], 0.0);
    }

    #[test]
    fn test_inputs_from_trade() {
        use crate::data::Side;
        use rust_decimal_macros::dec;

        let trade = Trade::new("NVDA", dec!(200), Side::Put)
            .expiry(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
            .delta(-0.2)
            .premium(dec!(3.00))
            .underlying_price(dec!(250));
        let inputs = FactorInputs::from_trade(&trade, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        assert_eq!(inputs.dte, 14);
        assert!((inputs.strike_distance - 0.2).abs() < 1e-12);
        assert!((inputs.premium_yield - 0.015).abs() < 1e-12);
        assert_eq!(inputs.contracts, 1);

        let features = inputs.to_features();
        assert_eq!(features["DTE"], 1.0);
        assert_eq!(features["Strike Distance"], 1.0);
        assert_eq!(features["Premium Yield"], 1.0);
        assert_eq!(features["Delta"], 1.0);
    }

    #[test]
    fn test_market_factors() {
        // Short history: neutral RSI and volatility rank both grade 1.0.
        let features = market_factors(&[100.0], 1);
        assert_eq!(features.len(), 3);
        assert_eq!(features["RSI"], 1.0);
        assert_eq!(features["IV Rank"], 1.0);
        assert_eq!(features["Sizing"], 1.0);

        // A steady rally is overbought.
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let features = market_factors(&rising, 5);
        assert_eq!(features["RSI"], 0.0);
        assert_eq!(features["Sizing"], 0.5);
    }

    #[test]
    fn test_annualized_roc() {
        // 2.50 premium on a 100 strike over 30 days
        assert_eq!(annualized_roc(2.5, 100.0, 30), 0.304);
        assert_eq!(annualized_roc(2.5, 100.0, 0), 0.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, RSI_PERIOD), 100.0);

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, RSI_PERIOD), 0.0);

        assert_eq!(rsi(&[100.0, 101.0], RSI_PERIOD), 50.0);

        let mixed = [100.0, 102.0, 101.0, 103.0, 102.0];
        // gains 4, losses 2 over 4 changes
        let value = rsi(&mixed, 4);
        assert!((value - 100.0 * 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_rank() {
        assert_eq!(volatility_rank(&[100.0, 101.0], VOLATILITY_RANK_WINDOW), 0.5);

        // Calm history followed by a volatile stretch ranks the latest vol highest.
        let mut prices: Vec<f64> = (0..40).map(|i| 100.0 + (i % 2) as f64 * 0.1).collect();
        for i in 0..5 {
            prices.push(if i % 2 == 0 { 110.0 } else { 95.0 });
        }
        let rank = volatility_rank(&prices, 5);
        assert!(rank > 0.9);
    }
}
