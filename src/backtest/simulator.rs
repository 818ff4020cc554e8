//! Day-by-day backtest simulator.
//!
//! Replays a price table one index at a time:
//! 1. Check the signal model's probability at the index
//! 2. Score the candidate with the trade scorer, using market factors
//!    graded from trailing prices plus the row's own features
//! 3. Reject below the fixed entry gate
//! 4. Build a volatility-scaled exit plan from trailing prices
//! 5. Scan the holding window for take-profit / stop-loss / time-stop
//! 6. Record and close the position in the ledger
//!
//! A bad row is skipped; nothing in the loop aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::data::{DataLoader, FeatureSet, LoaderError, PriceTable, Side, Trade};
use crate::ledger::{AuditLog, AuditRow, ClosePolicy, LedgerReport, PositionLedger};
use crate::scoring::{
    market_factors, positive_class_probabilities, ProbabilityProvider, ScoredTrade, TradeScorer,
};

use super::trade::{ExitReason, SimState, SimulatedTrade};
use super::volatility::{trailing_volatility, ExitPlan};

/// Minimum final score for a candidate to be entered.
pub const ENTRY_SCORE_GATE: f64 = 0.15;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Data loading failed: {0}")]
    Loader(#[from] LoaderError),

    #[error("Invalid backtest configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Symbol stamped on simulated trades.
    pub symbol: String,

    /// Signal probability at or above which a candidate is evaluated.
    pub predict_threshold: f64,

    /// Holding window before volatility scaling.
    pub base_holding_days: usize,

    /// Stop loss as a fraction of entry price (0.03 = 3%).
    pub stop_loss_pct: f64,

    /// Take profit as a fraction of entry price (0.05 = 5%).
    pub take_profit_pct: f64,

    /// Number of trailing returns used for volatility. All history if unset.
    pub volatility_lookback: Option<usize>,

    /// Side of simulated positions.
    pub side: Side,

    /// Contracts (or units) per position.
    pub quantity: u32,

    /// Ledger close policy for duplicate open positions.
    pub close_policy: ClosePolicy,

    /// Append accepted trades to this CSV audit log.
    pub audit_log_path: Option<PathBuf>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "SIM".to_string(),
            predict_threshold: 0.5,
            base_holding_days: 2,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
            volatility_lookback: None,
            side: Side::Long,
            quantity: 1,
            close_policy: ClosePolicy::default(),
            audit_log_path: None,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !(0.0..=1.0).contains(&self.predict_threshold) {
            return Err(BacktestError::InvalidConfig(format!(
                "predict_threshold must be within [0, 1], got {}",
                self.predict_threshold
            )));
        }
        if self.base_holding_days == 0 {
            return Err(BacktestError::InvalidConfig(
                "base_holding_days must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.stop_loss_pct) {
            return Err(BacktestError::InvalidConfig(format!(
                "stop_loss_pct must be within [0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if self.take_profit_pct < 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "take_profit_pct must be non-negative, got {}",
                self.take_profit_pct
            )));
        }
        if self.quantity == 0 {
            return Err(BacktestError::InvalidConfig("quantity must be positive".to_string()));
        }
        if self.volatility_lookback == Some(0) {
            return Err(BacktestError::InvalidConfig(
                "volatility_lookback must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a completed simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,

    /// Rows replayed.
    pub rows: usize,

    /// Indices where the signal fired.
    pub signals: usize,

    /// Candidates scored below the entry gate.
    pub rejected: usize,

    /// Signals that could not be traded (bad price, no future rows).
    pub skipped: usize,

    /// Fraction of rows where the thresholded signal matched the label.
    pub signal_accuracy: Option<f64>,

    /// Completed trades, in entry order.
    pub trades: Vec<SimulatedTrade>,

    /// Terminal ledger report.
    pub ledger: LedgerReport,
}

impl BacktestResult {
    pub fn total_trades(&self) -> usize {
        self.trades.len()
    }

    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.winning_trades() as f64 / self.trades.len() as f64
    }

    /// Average per-trade return in percent.
    pub fn avg_return_pct(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.total_return_pct() / self.trades.len() as f64
    }

    /// Sum of per-trade returns in percent.
    pub fn total_return_pct(&self) -> f64 {
        self.trades.iter().map(|t| t.return_pct()).sum()
    }

    pub fn exits(&self, reason: ExitReason) -> usize {
        self.trades.iter().filter(|t| t.exit_reason == reason).count()
    }

    pub fn summary(&self) -> String {
        let accuracy = self
            .signal_accuracy
            .map(|a| format!("{:.1}%", a * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "Backtest Results ({})\n\
             ----------------------------------------\n\
             Rows: {}\n\
             Signals: {} (rejected: {}, skipped: {})\n\
             Signal Accuracy: {}\n\
             \n\
             Trades: {} (W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             Avg Return: {:.2}%\n\
             Total Return: {:.2}%\n\
             Exits: take-profit {}, stop-loss {}, time-stop {}\n\
             \n\
             Open Positions: {}\n\
             Closed Positions: {}\n\
             Realized PnL: ${:.2}",
            self.symbol,
            self.rows,
            self.signals,
            self.rejected,
            self.skipped,
            accuracy,
            self.total_trades(),
            self.winning_trades(),
            self.total_trades() - self.winning_trades(),
            self.win_rate() * 100.0,
            self.avg_return_pct(),
            self.total_return_pct(),
            self.exits(ExitReason::TakeProfit),
            self.exits(ExitReason::StopLoss),
            self.exits(ExitReason::TimeStop),
            self.ledger.open_positions,
            self.ledger.closed_positions,
            self.ledger.realized_pnl,
        )
    }
}

/// Fraction of rows where `probability >= threshold` agrees with the label.
/// `None` unless every row is labelled.
pub fn signal_accuracy(table: &PriceTable, probabilities: &[f64], threshold: f64) -> Option<f64> {
    if !table.has_labels() || probabilities.len() != table.len() {
        return None;
    }
    let hits = table
        .rows
        .iter()
        .zip(probabilities)
        .filter(|(row, p)| row.label == Some(u8::from(**p >= threshold)))
        .count();
    Some(hits as f64 / table.len() as f64)
}

/// Per-run bookkeeping.
struct RunState {
    prices: Vec<f64>,
    probabilities: Vec<f64>,
    signal_accuracy: Option<f64>,
    signals: usize,
    rejected: usize,
    skipped: usize,
    trades: Vec<SimulatedTrade>,
}

/// A signal that passed the row checks and is ready to be scored.
struct Candidate {
    index: usize,
    trade: Trade,
    premium: Decimal,
    features: FeatureSet,
}

fn timestamp(date: Option<NaiveDate>) -> DateTime<Utc> {
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

/// The backtest simulator. Owns its ledger; use one simulator per run.
pub struct BacktestSimulator {
    config: BacktestConfig,
    scorer: TradeScorer,
    signal_model: Option<Arc<dyn ProbabilityProvider>>,
    ledger: PositionLedger,
    audit_log: Option<AuditLog>,
}

impl BacktestSimulator {
    /// Create a simulator. The ledger reports to the scorer's audit sink.
    pub fn new(config: BacktestConfig, scorer: TradeScorer) -> Self {
        let ledger = PositionLedger::with_sink(scorer.sink()).with_policy(config.close_policy);
        let audit_log = config.audit_log_path.clone().map(AuditLog::new);
        Self {
            config,
            scorer,
            signal_model: None,
            ledger,
            audit_log,
        }
    }

    /// Model whose positive-class probability drives entry signals.
    pub fn with_signal_model(mut self, model: Arc<dyn ProbabilityProvider>) -> Self {
        self.signal_model = Some(model);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Load a table from disk and run it.
    pub fn run_file(
        &mut self,
        path: &Path,
        loader: &DataLoader,
    ) -> Result<BacktestResult, BacktestError> {
        let table = loader.load(path)?;
        Ok(self.run(&table))
    }

    /// Run the simulation synchronously.
    pub fn run(&mut self, table: &PriceTable) -> BacktestResult {
        let mut state = self.begin(table);
        for i in 0..table.len() {
            let Some(candidate) = self.candidate(table, &mut state, i) else {
                continue;
            };
            let scored = self.scorer.score_trade(
                &candidate.trade,
                candidate.premium,
                self.config.side,
                Some(&candidate.features),
            );
            self.settle(table, &mut state, candidate, scored);
        }
        self.finish(table, state)
    }

    /// Run the simulation with scoring offloaded to the blocking pool.
    ///
    /// Each score is awaited before the ledger is touched, so ledger
    /// mutations happen in the same order as [`run`](Self::run).
    pub async fn run_async(&mut self, table: &PriceTable) -> BacktestResult {
        let mut state = self.begin(table);
        for i in 0..table.len() {
            let Some(candidate) = self.candidate(table, &mut state, i) else {
                continue;
            };
            let scored = self
                .scorer
                .score_trade_async(
                    candidate.trade.clone(),
                    candidate.premium,
                    self.config.side,
                    Some(candidate.features.clone()),
                )
                .await;
            match scored {
                Ok(scored) => self.settle(table, &mut state, candidate, scored),
                Err(e) => {
                    error!(index = i, "Scoring task failed: {}", e);
                    state.skipped += 1;
                }
            }
        }
        self.finish(table, state)
    }

    fn begin(&self, table: &PriceTable) -> RunState {
        let probabilities = match &self.signal_model {
            Some(model) => positive_class_probabilities(model.as_ref(), &table.feature_matrix())
                .unwrap_or_else(|| vec![0.0; table.len()]),
            None => {
                warn!(
                    symbol = %self.config.symbol,
                    "No signal model configured; no entries will be taken"
                );
                vec![0.0; table.len()]
            }
        };

        let accuracy = signal_accuracy(table, &probabilities, self.config.predict_threshold);
        if let Some(accuracy) = accuracy {
            info!(
                symbol = %self.config.symbol,
                "Signal accuracy vs label: {:.4}",
                accuracy
            );
        }

        RunState {
            prices: table.prices(),
            probabilities,
            signal_accuracy: accuracy,
            signals: 0,
            rejected: 0,
            skipped: 0,
            trades: Vec::new(),
        }
    }

    /// Scanning step: returns a candidate when the signal fires at `i` and
    /// the row can be traded.
    fn candidate(&self, table: &PriceTable, state: &mut RunState, i: usize) -> Option<Candidate> {
        let probability = state.probabilities[i];
        if probability < self.config.predict_threshold {
            return None;
        }
        state.signals += 1;

        let row = &table.rows[i];
        let entry = match Decimal::try_from(row.price) {
            Ok(entry) if row.price > 0.0 => entry,
            _ => {
                warn!(index = i, price = row.price, "Skipping row with invalid entry price");
                state.skipped += 1;
                return None;
            }
        };

        if i + 1 >= table.len() {
            debug!(index = i, "Signal on last row; nothing to hold");
            state.skipped += 1;
            return None;
        }

        debug!(index = i, probability, state = ?SimState::Evaluating, "Entry signal");

        let trade = Trade::new(&self.config.symbol, entry, self.config.side)
            .premium(entry)
            .underlying_price(entry)
            .quantity(self.config.quantity);

        // Table columns win over derived factors of the same name.
        let mut features = market_factors(&state.prices[..=i], self.config.quantity);
        features.extend(row.features.iter().map(|(k, v)| (k.clone(), *v)));

        Some(Candidate {
            index: i,
            trade,
            premium: entry,
            features,
        })
    }

    /// Gate, plan the exit, and book the round trip in the ledger.
    fn settle(
        &mut self,
        table: &PriceTable,
        state: &mut RunState,
        candidate: Candidate,
        scored: ScoredTrade,
    ) {
        let i = candidate.index;
        if scored.final_score < ENTRY_SCORE_GATE {
            state.rejected += 1;
            debug!(
                index = i,
                score = scored.final_score,
                state = ?SimState::Scanning,
                "Candidate below entry gate"
            );
            return;
        }

        let volatility = trailing_volatility(&state.prices, i, self.config.volatility_lookback);
        let plan = ExitPlan::new(
            volatility,
            self.config.base_holding_days,
            self.config.stop_loss_pct,
            self.config.take_profit_pct,
        );
        let entry_price = state.prices[i];
        let window_end = (i + plan.holding_days).min(table.len() - 1);

        let Some((offset, exit_price, reason)) =
            plan.find_exit(entry_price, &state.prices[i + 1..=window_end])
        else {
            warn!(index = i, "No valid price in holding window; skipping");
            state.skipped += 1;
            return;
        };
        let exit_index = i + 1 + offset;

        debug!(
            index = i,
            volatility,
            holding_days = plan.holding_days,
            stop_loss = plan.stop_loss_pct,
            take_profit = plan.take_profit_pct,
            state = ?SimState::Holding,
            "Position accepted"
        );

        let entry_date = table.rows[i].date;
        let exit_date = table.rows[exit_index].date;
        let exit_decimal = Decimal::try_from(exit_price).unwrap_or_default();

        self.ledger.record_trade_at(
            &candidate.trade,
            candidate.premium,
            self.config.side,
            self.config.quantity,
            timestamp(entry_date),
        );
        self.ledger
            .close_trade_at(&candidate.trade, exit_decimal, timestamp(exit_date));

        info!(
            symbol = %self.config.symbol,
            entry_index = i,
            exit_index,
            entry_price,
            exit_price,
            state = ?SimState::Closed,
            "Exited on {}",
            reason
        );

        self.append_audit(&scored, entry_date);

        state.trades.push(SimulatedTrade {
            side: self.config.side,
            entry_index: i,
            exit_index,
            entry_date,
            exit_date,
            entry_price,
            exit_price,
            exit_reason: reason,
            hybrid_score: scored.final_score,
            ml_probability: scored.ml_probability,
            conviction_score: scored.conviction.score,
            volatility,
            holding_days: plan.holding_days,
            stop_loss_pct: plan.stop_loss_pct,
            take_profit_pct: plan.take_profit_pct,
        });
    }

    fn append_audit(&self, scored: &ScoredTrade, date: Option<NaiveDate>) {
        let Some(log) = &self.audit_log else {
            return;
        };
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        if let Err(e) = log.append(&[AuditRow::from_scored(scored, date)]) {
            warn!(path = %log.path().display(), "Failed to append audit log: {}", e);
        }
    }

    fn finish(&mut self, table: &PriceTable, state: RunState) -> BacktestResult {
        let ledger = self.ledger.report();
        info!(
            symbol = %self.config.symbol,
            rows = table.len(),
            signals = state.signals,
            rejected = state.rejected,
            skipped = state.skipped,
            trades = state.trades.len(),
            "Backtest complete"
        );

        BacktestResult {
            symbol: self.config.symbol.clone(),
            rows: table.len(),
            signals: state.signals,
            rejected: state.rejected,
            skipped: state.skipped,
            signal_accuracy: state.signal_accuracy,
            trades: state.trades,
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::data::PriceRow;
    use crate::scoring::{ColumnProbability, ConstantProbability, ConvictionScorer, WeightTable};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    const SERIES: [f64; 5] = [100.0, 101.0, 99.0, 95.0, 110.0];

    fn table(prices: &[f64], probabilities: &[f64]) -> PriceTable {
        PriceTable::new(
            prices
                .iter()
                .zip(probabilities)
                .map(|(&p, &q)| PriceRow::new(p).with_feature("probability", q))
                .collect(),
        )
    }

    fn simulator(config: BacktestConfig) -> (BacktestSimulator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let model: Arc<dyn ProbabilityProvider> = Arc::new(ColumnProbability::new("probability"));
        let scorer = TradeScorer::new(&config.symbol)
            .with_provider(Arc::clone(&model))
            .with_sink(sink.clone());
        (BacktestSimulator::new(config, scorer).with_signal_model(model), sink)
    }

    fn holding(base_holding_days: usize) -> BacktestConfig {
        BacktestConfig {
            base_holding_days,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = BacktestConfig::default();
        assert_eq!(config.symbol, "SIM");
        assert_eq!(config.predict_threshold, 0.5);
        assert_eq!(config.base_holding_days, 2);
        assert_eq!(config.stop_loss_pct, 0.03);
        assert_eq!(config.take_profit_pct, 0.05);
        assert!(config.validate().is_ok());

        assert!(holding(0).validate().is_err());
        let bad = BacktestConfig {
            predict_threshold: 1.5,
            ..BacktestConfig::default()
        };
        assert!(matches!(bad.validate(), Err(BacktestError::InvalidConfig(_))));
    }

    #[test]
    fn test_short_window_time_stops() {
        let (mut sim, _) = simulator(holding(2));
        let result = sim.run(&table(&SERIES, &[0.9, 0.0, 0.0, 0.0, 0.0]));

        assert_eq!(result.signals, 1);
        assert_eq!(result.total_trades(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 0);
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.exit_price, 99.0);
        assert_eq!(trade.exit_reason, ExitReason::TimeStop);
        assert_eq!(trade.holding_days, 2);
        assert_eq!(trade.volatility, 0.01);

        assert_eq!(result.ledger.closed_positions, 1);
        assert_eq!(result.ledger.open_positions, 0);
        assert_eq!(sim.ledger().records()[0].exit_price, Some(dec!(99)));
    }

    #[test]
    fn test_longer_window_hits_stop_loss_first() {
        let (mut sim, _) = simulator(holding(4));
        let result = sim.run(&table(&SERIES, &[0.9, 0.0, 0.0, 0.0, 0.0]));

        assert_eq!(result.total_trades(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_index, 3);
        assert_eq!(trade.exit_price, 95.0);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(result.ledger.closed_positions, 1);
    }

    #[test]
    fn test_take_profit() {
        let (mut sim, _) = simulator(holding(2));
        let result = sim.run(&table(&[100.0, 106.0, 90.0], &[0.9, 0.0, 0.0]));

        let trade = &result.trades[0];
        assert_eq!(trade.exit_index, 1);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!(trade.is_winner());
    }

    #[test]
    fn test_window_clipped_at_end_of_series() {
        let (mut sim, _) = simulator(holding(10));
        let result = sim.run(&table(&[100.0, 101.0, 102.0], &[0.9, 0.0, 0.0]));

        let trade = &result.trades[0];
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.exit_price, 102.0);
        assert_eq!(trade.exit_reason, ExitReason::TimeStop);
    }

    #[test]
    fn test_low_score_is_rejected() {
        // Signal fires but the scorer has no model and no weights, so the
        // final score is 0.
        let sink = Arc::new(MemorySink::new());
        let scorer = TradeScorer::new("SIM")
            .with_conviction(ConvictionScorer::new(WeightTable::new(), Vec::new()))
            .with_sink(sink.clone());
        let mut sim = BacktestSimulator::new(BacktestConfig::default(), scorer)
            .with_signal_model(Arc::new(ColumnProbability::new("probability")));

        let result = sim.run(&table(&SERIES, &[0.9, 0.9, 0.0, 0.0, 0.0]));
        assert_eq!(result.signals, 2);
        assert_eq!(result.rejected, 2);
        assert!(result.trades.is_empty());
        assert!(sim.ledger().records().is_empty());
        assert_eq!(sink.scores().len(), 2);
    }

    #[test]
    fn test_no_signal_model_takes_no_trades() {
        let scorer = TradeScorer::new("SIM")
            .with_provider(Arc::new(ConstantProbability(1.0)))
            .with_sink(Arc::new(MemorySink::new()));
        let mut sim = BacktestSimulator::new(BacktestConfig::default(), scorer);

        let result = sim.run(&PriceTable::from_prices(&SERIES));
        assert_eq!(result.signals, 0);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let (mut sim, _) = simulator(holding(2));
        let prices = [100.0, f64::NAN, 0.0, 101.0, 102.0];
        let result = sim.run(&table(&prices, &[0.0, 0.9, 0.9, 0.0, 0.9]));

        // NaN and zero entry prices, then a signal on the last row.
        assert_eq!(result.signals, 3);
        assert_eq!(result.skipped, 3);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_bad_row_in_holding_window_never_fills() {
        for bad in [0.0, -5.0] {
            let (mut sim, _) = simulator(holding(2));
            let result = sim.run(&table(&[100.0, bad, 101.0], &[0.9, 0.0, 0.0]));

            assert_eq!(result.total_trades(), 1);
            let trade = &result.trades[0];
            assert_eq!(trade.exit_index, 2);
            assert_eq!(trade.exit_price, 101.0);
            assert_eq!(trade.exit_reason, ExitReason::TimeStop);
            assert_eq!(sim.ledger().records()[0].exit_price, Some(dec!(101)));
        }
    }

    #[test]
    fn test_market_factors_drive_conviction() {
        // No scorer model: the entry rests on conviction alone.
        let sink = Arc::new(MemorySink::new());
        let scorer = TradeScorer::new("SIM").with_sink(sink.clone());
        let mut sim = BacktestSimulator::new(holding(2), scorer)
            .with_signal_model(Arc::new(ColumnProbability::new("probability")));

        let result = sim.run(&table(&SERIES, &[0.9, 0.0, 0.0, 0.0, 0.0]));
        assert_eq!(result.total_trades(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.ml_probability, 0.0);
        assert_eq!(trade.conviction_score, 100.0);
        assert!((trade.hybrid_score - 0.3).abs() < 1e-9);
        assert!(sink.lines()[0].contains("Conviction=100.00"));
    }

    #[test]
    fn test_signal_accuracy() {
        let rows = [(100.0, 0.9, 1), (101.0, 0.2, 0), (99.0, 0.7, 0), (98.0, 0.1, 0)]
            .iter()
            .map(|&(p, q, l)| PriceRow::new(p).with_feature("probability", q).with_label(l))
            .collect();
        let (mut sim, _) = simulator(holding(2));
        let result = sim.run(&PriceTable::new(rows));
        assert_eq!(result.signal_accuracy, Some(0.75));

        let (mut sim, _) = simulator(holding(2));
        let result = sim.run(&table(&SERIES, &[0.0; 5]));
        assert_eq!(result.signal_accuracy, None);
    }

    #[test]
    fn test_dated_rows_stamp_ledger() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let rows = vec![
            PriceRow::new(100.0).with_date(d(2)).with_feature("probability", 0.9),
            PriceRow::new(101.0).with_date(d(3)).with_feature("probability", 0.0),
            PriceRow::new(99.0).with_date(d(4)).with_feature("probability", 0.0),
        ];
        let (mut sim, _) = simulator(holding(2));
        let result = sim.run(&PriceTable::new(rows));

        assert_eq!(result.trades[0].entry_date, Some(d(2)));
        assert_eq!(result.trades[0].exit_date, Some(d(4)));
        let record = &sim.ledger().records()[0];
        assert_eq!(record.entry_time.date_naive(), d(2));
        assert_eq!(record.exit_time.map(|t| t.date_naive()), Some(d(4)));
    }

    #[test]
    fn test_audit_log_written_for_accepted_trades() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trade_log.csv");
        let config = BacktestConfig {
            audit_log_path: Some(path.clone()),
            ..BacktestConfig::default()
        };
        let (mut sim, _) = simulator(config);
        sim.run(&table(&SERIES, &[0.9, 0.0, 0.9, 0.0, 0.0]));

        let rows = AuditLog::new(path).read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_type, "Buy Underlying");
        assert!((rows[0].ml_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_report_emitted_once() {
        let (mut sim, sink) = simulator(holding(2));
        sim.run(&table(&SERIES, &[0.9, 0.0, 0.0, 0.0, 0.0]));

        let lines = sink.lines();
        assert_eq!(lines.iter().filter(|l| l.contains("PnL Report")).count(), 1);
        assert!(lines.iter().any(|l| l.starts_with("[TradeScorer] LONG trade for SIM")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let (mut sim, _) = simulator(holding(2));
        let result = sim.run_file(Path::new("/no/such/table.csv"), &DataLoader::new());
        assert!(matches!(result, Err(BacktestError::Loader(LoaderError::FileNotFound(_)))));
    }

    #[tokio::test]
    async fn test_async_run_matches_sync() {
        let probabilities = [0.9, 0.0, 0.9, 0.0, 0.0];

        let (mut sync_sim, _) = simulator(holding(2));
        let sync = sync_sim.run(&table(&SERIES, &probabilities));

        let (mut async_sim, _) = simulator(holding(2));
        let async_result = async_sim.run_async(&table(&SERIES, &probabilities)).await;

        assert_eq!(sync.trades, async_result.trades);
        assert_eq!(sync.ledger.closed_positions, async_result.ledger.closed_positions);
    }
}
