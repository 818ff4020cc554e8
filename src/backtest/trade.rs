//! Simulated trade lifecycle.
//!
//! A trading day moves through:
//! - Scanning: no signal at this index
//! - Evaluating: signal fired, candidate being scored
//! - Holding: accepted, watching the exit window
//! - Closed: exit found and the ledger updated

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::Side;

/// Simulator state for the current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Scanning,
    Evaluating,
    Holding,
    Closed,
}

/// Reason for exiting a simulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Price reached the take-profit level.
    TakeProfit,
    /// Price reached the stop-loss level.
    StopLoss,
    /// Holding window ran out.
    TimeStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TakeProfit => "take-profit",
            Self::StopLoss => "stop-loss",
            Self::TimeStop => "time-stop",
        };
        f.write_str(s)
    }
}

/// A completed simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_date: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Final adjusted score at entry.
    pub hybrid_score: f64,
    pub ml_probability: f64,
    pub conviction_score: f64,
    /// Trailing volatility used for the exit plan.
    pub volatility: f64,
    pub holding_days: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl SimulatedTrade {
    /// Price return in percent, signed for the side (short options gain
    /// when the price falls).
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let change = (self.exit_price - self.entry_price) / self.entry_price * 100.0;
        if self.side.is_option() {
            -change
        } else {
            change
        }
    }

    pub fn is_winner(&self) -> bool {
        self.return_pct() > 0.0
    }

    /// Rows between entry and exit.
    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side, entry: f64, exit: f64) -> SimulatedTrade {
        SimulatedTrade {
            side,
            entry_index: 3,
            exit_index: 5,
            entry_date: None,
            exit_date: None,
            entry_price: entry,
            exit_price: exit,
            exit_reason: ExitReason::TimeStop,
            hybrid_score: 0.5,
            ml_probability: 0.7,
            conviction_score: 0.0,
            volatility: 0.01,
            holding_days: 2,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
        }
    }

    #[test]
    fn test_long_return() {
        let t = trade(Side::Long, 100.0, 105.0);
        assert!((t.return_pct() - 5.0).abs() < 1e-9);
        assert!(t.is_winner());
        assert_eq!(t.bars_held(), 2);
    }

    #[test]
    fn test_short_option_return_is_inverted() {
        let t = trade(Side::Put, 2.0, 1.5);
        assert!((t.return_pct() - 25.0).abs() < 1e-9);
        assert!(t.is_winner());
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::StopLoss.to_string(), "stop-loss");
        assert_eq!(ExitReason::TimeStop.to_string(), "time-stop");
    }
}
