//! Position ledger.
//!
//! Append-only log of entries and exits. The ledger is the source of truth
//! for whether a position is still open. Lookup misses on close are logged
//! and ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditSink, TracingSink};
use crate::data::{Side, Trade};

use super::record::TradeRecord;

/// Which open record to close when several match the same instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// Most recently opened record first.
    #[default]
    Lifo,
    /// Oldest open record first (lot-matching accounting).
    Fifo,
}

/// Summary of the ledger at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReport {
    pub open_positions: usize,
    pub closed_positions: usize,
    pub realized_pnl: Decimal,
    /// Placeholder: needs a live price feed to compute.
    pub unrealized_pnl: Decimal,
    pub open: Vec<TradeRecord>,
}

/// Ledger of trade records. One instance per symbol when run in parallel.
pub struct PositionLedger {
    records: Vec<TradeRecord>,
    policy: ClosePolicy,
    sink: Arc<dyn AuditSink>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            records: Vec::new(),
            policy: ClosePolicy::default(),
            sink,
        }
    }

    pub fn with_policy(mut self, policy: ClosePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ClosePolicy {
        self.policy
    }

    /// Open a new position stamped with the current time.
    ///
    /// Duplicates are allowed: layered entries on the same instrument coexist.
    pub fn record_trade(
        &mut self,
        trade: &Trade,
        premium: Decimal,
        side: Side,
        quantity: u32,
    ) -> &TradeRecord {
        self.record_trade_at(trade, premium, side, quantity, Utc::now())
    }

    /// Open a new position with an explicit entry time (simulated clock).
    pub fn record_trade_at(
        &mut self,
        trade: &Trade,
        premium: Decimal,
        side: Side,
        quantity: u32,
        entry_time: DateTime<Utc>,
    ) -> &TradeRecord {
        let record = TradeRecord::open(trade, premium, side, quantity, entry_time);
        self.sink.trade_recorded(&record);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Close one open position on the trade's instrument, stamped with the
    /// current time. Returns `None` (after logging a warning) when nothing
    /// matches.
    pub fn close_trade(&mut self, trade: &Trade, exit_price: Decimal) -> Option<&TradeRecord> {
        self.close_trade_at(trade, exit_price, Utc::now())
    }

    /// Close one open position with an explicit exit time.
    pub fn close_trade_at(
        &mut self,
        trade: &Trade,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Option<&TradeRecord> {
        let mut candidates = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_open() && r.matches(trade))
            .map(|(i, _)| i);

        let selected = match self.policy {
            ClosePolicy::Lifo => candidates.last(),
            ClosePolicy::Fifo => candidates.next(),
        };

        let Some(index) = selected else {
            self.sink.close_missed(trade);
            return None;
        };

        let record = &mut self.records[index];
        record.close(exit_price, exit_time);
        self.sink.trade_closed(record, record.realized_pnl());
        Some(&self.records[index])
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn open_positions(&self) -> Vec<&TradeRecord> {
        self.records.iter().filter(|r| r.is_open()).collect()
    }

    pub fn closed_positions(&self) -> Vec<&TradeRecord> {
        self.records.iter().filter(|r| !r.is_open()).collect()
    }

    /// Sum of realized PnL over closed positions.
    pub fn realized_pnl(&self) -> Decimal {
        self.records.iter().map(|r| r.realized_pnl()).sum()
    }

    /// Unrealized PnL over open positions that have a current price.
    pub fn unrealized_pnl<F>(&self, current_price: F) -> Decimal
    where
        F: Fn(&TradeRecord) -> Option<Decimal>,
    {
        self.records
            .iter()
            .filter(|r| r.is_open())
            .filter_map(|r| current_price(r).map(|p| r.unrealized_pnl(p)))
            .sum()
    }

    /// Build the summary report and hand it to the audit sink.
    pub fn report(&self) -> LedgerReport {
        let open: Vec<TradeRecord> = self.open_positions().into_iter().cloned().collect();
        let report = LedgerReport {
            open_positions: open.len(),
            closed_positions: self.records.len() - open.len(),
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: Decimal::ZERO,
            open,
        };
        self.sink.report(&report);
        report
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn nvda_put() -> Trade {
        Trade::new("NVDA", dec!(100), Side::Put).expiry(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_round_trip_realized_pnl() {
        let mut ledger = PositionLedger::new();
        let trade = nvda_put();

        ledger.record_trade(&trade, dec!(2.00), Side::Put, 1);
        let closed = ledger.close_trade(&trade, dec!(1.50)).unwrap();
        assert_eq!(closed.realized_pnl(), dec!(50.00));

        let report = ledger.report();
        assert_eq!(report.open_positions, 0);
        assert_eq!(report.closed_positions, 1);
        assert_eq!(report.realized_pnl, dec!(50.00));
        assert_eq!(report.unrealized_pnl, dec!(0));
    }

    #[test]
    fn test_close_is_lifo_by_default() {
        let mut ledger = PositionLedger::new();
        let trade = nvda_put();

        ledger.record_trade_at(&trade, dec!(2.00), Side::Put, 1, at(2));
        ledger.record_trade_at(&trade, dec!(3.00), Side::Put, 1, at(3));

        let closed = ledger.close_trade(&trade, dec!(1.00)).unwrap();
        assert_eq!(closed.entry_price, dec!(3.00));

        let open = ledger.open_positions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].entry_price, dec!(2.00));
        assert_eq!(open[0].entry_time, at(2));
    }

    #[test]
    fn test_fifo_policy_closes_oldest() {
        let mut ledger = PositionLedger::new().with_policy(ClosePolicy::Fifo);
        let trade = nvda_put();

        ledger.record_trade(&trade, dec!(2.00), Side::Put, 1);
        ledger.record_trade(&trade, dec!(3.00), Side::Put, 1);

        let closed = ledger.close_trade(&trade, dec!(1.00)).unwrap();
        assert_eq!(closed.entry_price, dec!(2.00));
        assert_eq!(ledger.open_positions()[0].entry_price, dec!(3.00));
    }

    #[test]
    fn test_close_without_match_is_noop() {
        let sink = Arc::new(MemorySink::new());
        let mut ledger = PositionLedger::with_sink(sink.clone());
        let trade = nvda_put();
        let other = Trade::new("NVDA", dec!(105), Side::Put);

        ledger.record_trade(&trade, dec!(2.00), Side::Put, 1);
        assert!(ledger.close_trade(&other, dec!(1.00)).is_none());
        assert_eq!(ledger.open_positions().len(), 1);
        assert!(sink.lines().iter().any(|l| l.contains("No open trade found")));
    }

    #[test]
    fn test_closed_records_are_not_reclosed() {
        let mut ledger = PositionLedger::new();
        let trade = nvda_put();

        ledger.record_trade(&trade, dec!(2.00), Side::Put, 1);
        assert!(ledger.close_trade(&trade, dec!(1.00)).is_some());
        assert!(ledger.close_trade(&trade, dec!(0.50)).is_none());
        assert_eq!(ledger.records()[0].exit_price, Some(dec!(1.00)));
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn test_unrealized_pnl_with_prices() {
        let mut ledger = PositionLedger::new();
        let trade = nvda_put();
        let other = Trade::new("AMD", dec!(150), Side::Call);

        ledger.record_trade(&trade, dec!(2.00), Side::Put, 2);
        ledger.record_trade(&other, dec!(4.00), Side::Call, 1);

        let pnl = ledger.unrealized_pnl(|r| (r.symbol == "NVDA").then_some(dec!(1.00)));
        assert_eq!(pnl, dec!(200));
    }
}
