//! Position ledger and trade audit log.

pub mod audit_log;
pub mod record;
pub mod tracker;

pub use audit_log::{AuditLog, AuditLogError, AuditRow};
pub use record::TradeRecord;
pub use tracker::{ClosePolicy, LedgerReport, PositionLedger};
