//! Audit observers.
//!
//! Scoring decisions, ledger mutations and the terminal report are handed to
//! an [`AuditSink`] owned by each component instead of going through a global
//! logger. [`TracingSink`] forwards to `tracing`; [`MemorySink`] keeps lines in
//! memory so callers (and tests) can inspect them.

use std::sync::{Mutex, PoisonError};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::data::Trade;
use crate::ledger::{LedgerReport, TradeRecord};
use crate::scoring::ScoreAudit;

pub trait AuditSink: Send + Sync {
    /// One audit line per scoring call.
    fn trade_scored(&self, audit: &ScoreAudit);

    fn trade_recorded(&self, record: &TradeRecord);

    fn trade_closed(&self, record: &TradeRecord, realized_pnl: Decimal);

    /// `close_trade` found no open record for the instrument.
    fn close_missed(&self, trade: &Trade);

    fn report(&self, report: &LedgerReport);
}

fn recorded_line(record: &TradeRecord) -> String {
    format!("[PositionLedger] Recorded trade: {}", record)
}

fn closed_line(record: &TradeRecord, realized_pnl: Decimal) -> String {
    format!(
        "[PositionLedger] Closed trade: {}, exit_price={:.2}, realized PnL={:.2}",
        record,
        record.exit_price.unwrap_or_default(),
        realized_pnl
    )
}

fn missed_line(trade: &Trade) -> String {
    format!(
        "[PositionLedger] No open trade found for {} {} {}",
        trade.symbol,
        trade.strike,
        trade
            .expiry
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}

fn report_lines(report: &LedgerReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.open.len() + 6);
    lines.push("[PositionLedger] ===== PnL Report =====".to_string());
    lines.push(format!("[PositionLedger] Open Positions: {}", report.open_positions));
    for record in &report.open {
        lines.push(format!("  - {}", record));
    }
    lines.push(format!("[PositionLedger] Closed Positions: {}", report.closed_positions));
    lines.push(format!("[PositionLedger] Total Realized PnL: {:.2}", report.realized_pnl));
    lines.push(format!(
        "[PositionLedger] Estimated Unrealized PnL: {:.2}",
        report.unrealized_pnl
    ));
    lines.push("[PositionLedger] ======================".to_string());
    lines
}

/// Forwards audit events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn trade_scored(&self, audit: &ScoreAudit) {
        info!("{}", audit);
    }

    fn trade_recorded(&self, record: &TradeRecord) {
        info!("{}", recorded_line(record));
    }

    fn trade_closed(&self, record: &TradeRecord, realized_pnl: Decimal) {
        info!("{}", closed_line(record, realized_pnl));
    }

    fn close_missed(&self, trade: &Trade) {
        warn!("{}", missed_line(trade));
    }

    fn report(&self, report: &LedgerReport) {
        for line in report_lines(report) {
            info!("{}", line);
        }
    }
}

/// Keeps every audit line (and every structured score) in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    scores: Mutex<Vec<ScoreAudit>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines emitted so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Structured scoring audits, in order.
    pub fn scores(&self) -> Vec<ScoreAudit> {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl AuditSink for MemorySink {
    fn trade_scored(&self, audit: &ScoreAudit) {
        self.push(audit.to_string());
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(audit.clone());
    }

    fn trade_recorded(&self, record: &TradeRecord) {
        self.push(recorded_line(record));
    }

    fn trade_closed(&self, record: &TradeRecord, realized_pnl: Decimal) {
        self.push(closed_line(record, realized_pnl));
    }

    fn close_missed(&self, trade: &Trade) {
        self.push(missed_line(trade));
    }

    fn report(&self, report: &LedgerReport) {
        for line in report_lines(report) {
            self.push(line);
        }
    }
}
