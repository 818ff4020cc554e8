//! Backtest simulation.
//!
//! - Trade lifecycle states and exit reasons
//! - Volatility-scaled exit plans
//! - Day-by-day simulator over a price table
//! - Parallel per-symbol runs

pub mod batch;
pub mod simulator;
pub mod trade;
pub mod volatility;

pub use batch::run_symbols;
pub use simulator::{
    signal_accuracy, BacktestConfig, BacktestError, BacktestResult, BacktestSimulator,
    ENTRY_SCORE_GATE,
};
pub use trade::{ExitReason, SimState, SimulatedTrade};
pub use volatility::{log_return_volatility, trailing_volatility, ExitPlan, DEFAULT_VOLATILITY};
