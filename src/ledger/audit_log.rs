//! Scored-trade audit log.
//!
//! CSV file with a fixed header, appended to across runs. The header is
//! written only when the file is new or empty.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Side;
use crate::scoring::ScoredTrade;

#[derive(Error, Debug)]
pub enum AuditLogError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Type")]
    pub trade_type: String,
    #[serde(rename = "Strike")]
    pub strike: Decimal,
    #[serde(rename = "Premium")]
    pub premium: Decimal,
    #[serde(rename = "DTE")]
    pub dte: Option<i64>,
    #[serde(rename = "Conviction")]
    pub conviction: f64,
    /// Triggered override names, comma-joined.
    #[serde(rename = "Overrides")]
    pub overrides: String,
    #[serde(rename = "ML Score")]
    pub ml_score: f64,
    #[serde(rename = "Hybrid Score")]
    pub hybrid_score: f64,
}

impl AuditRow {
    /// Row for a scored trade evaluated on `date`.
    pub fn from_scored(scored: &ScoredTrade, date: NaiveDate) -> Self {
        let trade_type = match scored.side {
            Side::Call => "Sell Call",
            Side::Put => "Sell Put",
            Side::Long => "Buy Underlying",
        };
        Self {
            date,
            trade_type: trade_type.to_string(),
            strike: scored.trade.strike,
            premium: scored.premium,
            dte: scored.trade.dte(date),
            conviction: scored.conviction.score,
            overrides: scored.conviction.overrides.join(", "),
            ml_score: scored.ml_probability,
            hybrid_score: scored.final_score,
        }
    }
}

/// Append-only CSV audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows, writing the header first if the file is new or empty.
    pub fn append(&self, rows: &[AuditRow]) -> Result<(), AuditLogError> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let write_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Every row in the log. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<AuditRow>, AuditLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader.deserialize().collect::<Result<Vec<AuditRow>, _>>()?;
        Ok(rows)
    }
}
