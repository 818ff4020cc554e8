//! Volatility-scaled exit plans.
//!
//! Volatility is the population standard deviation of log returns over the
//! trailing prices (up to and including the entry index). Higher volatility
//! shortens the holding window and widens both exit thresholds.

use statrs::statistics::Statistics;
use tracing::warn;

use super::trade::ExitReason;

/// Volatility used when there are fewer than two usable prices.
pub const DEFAULT_VOLATILITY: f64 = 0.01;

/// Standard deviation of log returns. `None` when no return can be formed
/// (fewer than two consecutive positive, finite prices).
pub fn log_return_volatility(prices: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w.iter().all(|p| p.is_finite() && *p > 0.0))
        .map(|w| (w[1] / w[0]).ln())
        .collect();

    if returns.is_empty() {
        return None;
    }

    let sigma = returns.iter().population_std_dev();
    sigma.is_finite().then_some(sigma)
}

/// Volatility of the prices up to and including `index`, optionally limited
/// to the last `lookback` returns. Falls back to [`DEFAULT_VOLATILITY`].
pub fn trailing_volatility(prices: &[f64], index: usize, lookback: Option<usize>) -> f64 {
    let end = index.min(prices.len().saturating_sub(1));
    let start = lookback.map(|n| end.saturating_sub(n)).unwrap_or(0);
    let window = prices.get(start..=end).unwrap_or(&[]);

    match log_return_volatility(window) {
        Some(sigma) => sigma,
        None => {
            warn!(
                index,
                prices = window.len(),
                "Insufficient history for volatility; using default {}",
                DEFAULT_VOLATILITY
            );
            DEFAULT_VOLATILITY
        }
    }
}

fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Holding window and exit thresholds for one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPlan {
    pub volatility: f64,
    pub holding_days: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl ExitPlan {
    /// Scale base parameters by volatility:
    /// `holding = max(1, round(base / (1 + v)))`, thresholds `* (1 + v)`.
    pub fn new(
        volatility: f64,
        base_holding_days: usize,
        base_stop_loss_pct: f64,
        base_take_profit_pct: f64,
    ) -> Self {
        let scale = 1.0 + volatility;
        let holding_days = ((base_holding_days as f64 / scale).round() as usize).max(1);
        Self {
            volatility,
            holding_days,
            stop_loss_pct: base_stop_loss_pct * scale,
            take_profit_pct: base_take_profit_pct * scale,
        }
    }

    pub fn take_profit_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.take_profit_pct)
    }

    pub fn stop_loss_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    /// First exit in `window` (the prices after entry, oldest first).
    ///
    /// Returns `(offset, price, reason)`. Take-profit is checked before
    /// stop-loss on each day; without either, the last valid price in the
    /// window is a time-stop. Non-finite and non-positive prices are bad
    /// rows and never fill. `None` when the window has no valid price.
    pub fn find_exit(&self, entry_price: f64, window: &[f64]) -> Option<(usize, f64, ExitReason)> {
        let take_profit = self.take_profit_price(entry_price);
        let stop_loss = self.stop_loss_price(entry_price);

        for (offset, &price) in window.iter().enumerate() {
            if !is_valid_price(price) {
                continue;
            }
            if price >= take_profit {
                return Some((offset, price, ExitReason::TakeProfit));
            }
            if price <= stop_loss {
                return Some((offset, price, ExitReason::StopLoss));
            }
        }

        window
            .iter()
            .enumerate()
            .rev()
            .find(|(_, p)| is_valid_price(**p))
            .map(|(offset, &price)| (offset, price, ExitReason::TimeStop))
    }
}
