//! Ledger entries.
//!
//! A record is created open, closed exactly once, and never removed.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{Side, Trade, SHARES_PER_CONTRACT};

/// A single position in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub strike: Decimal,
    pub expiry: Option<NaiveDate>,
    pub side: Side,
    pub quantity: u32,
    /// Premium (or price) at which the position was opened.
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl TradeRecord {
    pub fn open(
        trade: &Trade,
        entry_price: Decimal,
        side: Side,
        quantity: u32,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: trade.symbol.clone(),
            strike: trade.strike,
            expiry: trade.expiry,
            side,
            quantity,
            entry_price,
            entry_time,
            exit_price: None,
            exit_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }

    /// Whether this record refers to the same instrument (symbol, strike, expiry).
    pub fn matches(&self, trade: &Trade) -> bool {
        self.symbol == trade.symbol && self.strike == trade.strike && self.expiry == trade.expiry
    }

    /// Short-option PnL against `current_price`. Non-option sides report zero.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        self.short_option_pnl(current_price)
    }

    /// Realized PnL once closed, zero while open.
    pub fn realized_pnl(&self) -> Decimal {
        match self.exit_price {
            Some(exit) => self.short_option_pnl(exit),
            None => Decimal::ZERO,
        }
    }

    fn short_option_pnl(&self, price: Decimal) -> Decimal {
        if !self.side.is_option() {
            return Decimal::ZERO;
        }
        (self.entry_price - price) * Decimal::from(self.quantity) * Decimal::from(SHARES_PER_CONTRACT)
    }

    /// Set the exit. Only the ledger calls this, and only on open records.
    pub(crate) fn close(&mut self, exit_price: Decimal, exit_time: DateTime<Utc>) {
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} strike {} exp {}, entry={:.2}, qty={}",
            self.side,
            self.symbol,
            self.strike,
            self.expiry
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.entry_price,
            self.quantity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn put_record(entry: Decimal, qty: u32) -> TradeRecord {
        let trade = Trade::new("NVDA", dec!(100), Side::Put);
        TradeRecord::open(&trade, entry, Side::Put, qty, Utc::now())
    }

    #[test]
    fn test_short_put_pnl() {
        let mut record = put_record(dec!(2.00), 1);
        assert!(record.is_open());
        assert_eq!(record.realized_pnl(), dec!(0));
        assert_eq!(record.unrealized_pnl(dec!(1.25)), dec!(75));

        record.close(dec!(1.50), Utc::now());
        assert!(!record.is_open());
        assert_eq!(record.realized_pnl(), dec!(50));
    }

    #[test]
    fn test_loss_scales_with_quantity() {
        let mut record = put_record(dec!(2.00), 3);
        record.close(dec!(3.00), Utc::now());
        assert_eq!(record.realized_pnl(), dec!(-300));
    }

    #[test]
    fn test_underlying_side_has_no_pnl() {
        let trade = Trade::new("SIM", dec!(100), Side::Long);
        let mut record = TradeRecord::open(&trade, dec!(100), Side::Long, 1, Utc::now());
        record.close(dec!(110), Utc::now());
        assert_eq!(record.realized_pnl(), dec!(0));
        assert_eq!(record.unrealized_pnl(dec!(90)), dec!(0));
    }
}
