pub mod audit;
pub mod backtest;
pub mod config;
pub mod data;
pub mod ledger;
pub mod scoring;

// Re-export commonly used types
pub use audit::{AuditSink, MemorySink, TracingSink};
pub use backtest::{BacktestConfig, BacktestResult, BacktestSimulator, ExitReason, SimulatedTrade};
pub use config::{ConfigError, EngineConfig};
pub use data::{DataLoader, PriceRow, PriceTable, Side, Trade};
pub use ledger::{AuditLog, ClosePolicy, LedgerReport, PositionLedger, TradeRecord};
pub use scoring::{
    ConvictionResult, ConvictionScorer, ProbabilityProvider, RiskAdjuster, ScoredTrade, TradeScorer,
};
