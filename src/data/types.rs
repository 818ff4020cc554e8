//! Core data types for trade scoring and simulation.
//!
//! These types represent the candidate trades handed to the scorer and the
//! historical price/feature table replayed by the simulator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Shares controlled by one option contract.
pub const SHARES_PER_CONTRACT: i64 = 100;

/// Named factor values. Ordered by name so feature vectors handed to a
/// probability provider are always laid out the same way.
pub type FeatureSet = BTreeMap<String, f64>;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Call,
    Put,
    /// Position in the underlying itself.
    Long,
}

impl Side {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            "L" | "LONG" | "UNDERLYING" => Some(Self::Long),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
            Self::Long => "LONG",
        }
    }

    /// Whether the side is an option contract (PnL uses the contract multiplier).
    pub fn is_option(&self) -> bool {
        matches!(self, Self::Call | Self::Put)
    }

    /// Binary encoding used as a model feature: 1.0 for calls, 0.0 otherwise.
    pub fn as_binary(&self) -> f64 {
        if *self == Self::Call {
            1.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate option trade.
///
/// `symbol`, `strike` and `side` are required. Everything else is optional
/// and defaults to zero (or "no expiry") so scoring never fails on a
/// partially described candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Underlying symbol (e.g., "NVDA").
    pub symbol: String,
    /// Strike price.
    pub strike: Decimal,
    /// Expiration date, if known.
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    /// Call, put or underlying.
    pub side: Side,
    /// Option delta.
    #[serde(default)]
    pub delta: f64,
    /// Underlying price when the candidate was built.
    #[serde(default)]
    pub underlying_price: Decimal,
    /// Premium per share.
    #[serde(default)]
    pub premium: Decimal,
    /// Capital tied up if assigned. Defaults to `strike * 100`.
    #[serde(default)]
    pub required_capital: Option<Decimal>,
    /// Number of contracts.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Trade {
    pub fn new(symbol: &str, strike: Decimal, side: Side) -> Self {
        Self {
            symbol: symbol.to_string(),
            strike,
            expiry: None,
            side,
            delta: 0.0,
            underlying_price: Decimal::ZERO,
            premium: Decimal::ZERO,
            required_capital: None,
            quantity: 1,
        }
    }

    pub fn expiry(mut self, expiry: NaiveDate) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn premium(mut self, premium: Decimal) -> Self {
        self.premium = premium;
        self
    }

    pub fn underlying_price(mut self, price: Decimal) -> Self {
        self.underlying_price = price;
        self
    }

    pub fn required_capital(mut self, capital: Decimal) -> Self {
        self.required_capital = Some(capital);
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Capital required if the contract is assigned.
    pub fn capital_required(&self) -> Decimal {
        self.required_capital
            .unwrap_or(self.strike * Decimal::from(SHARES_PER_CONTRACT))
    }

    /// Expiry encoded as a `YYYYMMDD` number, 0.0 when unknown.
    pub fn expiry_numeric(&self) -> f64 {
        self.expiry
            .map(|d| (d.year() * 10_000 + d.month() as i32 * 100 + d.day() as i32) as f64)
            .unwrap_or(0.0)
    }

    /// Days to expiry as of `date`.
    pub fn dte(&self, date: NaiveDate) -> Option<i64> {
        self.expiry.map(|e| (e - date).num_days())
    }
}

/// Feature matrix handed to a probability provider.
///
/// Columns are sorted by name; rows hold values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Single-row matrix from a feature set.
    pub fn from_features(features: &FeatureSet) -> Self {
        Self {
            columns: features.keys().cloned().collect(),
            rows: vec![features.values().copied().collect()],
        }
    }

    /// Matrix from several feature sets. Columns are the union of all keys;
    /// a row missing a column gets 0.0.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a FeatureSet> + Clone) -> Self {
        let mut columns: Vec<String> = rows
            .clone()
            .into_iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        columns.sort();
        columns.dedup();

        let rows = rows
            .into_iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row of the historical input table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    /// Row date, when the table has a date column.
    pub date: Option<NaiveDate>,
    /// Price of the instrument.
    pub price: f64,
    /// Ground-truth label (0/1), when present.
    pub label: Option<u8>,
    /// All numeric columns except `label`, including `price`.
    pub features: FeatureSet,
}

impl PriceRow {
    pub fn new(price: f64) -> Self {
        let mut features = FeatureSet::new();
        features.insert("price".to_string(), price);
        Self {
            date: None,
            price,
            label: None,
            features,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_label(mut self, label: u8) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_feature(mut self, name: &str, value: f64) -> Self {
        self.features.insert(name.to_string(), value);
        self
    }
}

/// Time-ordered price/feature table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    pub fn new(mut rows: Vec<PriceRow>) -> Self {
        // Stable sort keeps file order for rows without dates.
        if rows.iter().all(|r| r.date.is_some()) {
            rows.sort_by_key(|r| r.date);
        }
        Self { rows }
    }

    /// Table of bare prices (no dates, labels or extra features).
    pub fn from_prices(prices: &[f64]) -> Self {
        Self {
            rows: prices.iter().map(|&p| PriceRow::new(p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.price).collect()
    }

    pub fn has_labels(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.label.is_some())
    }

    /// Feature matrix over every row, in row order.
    pub fn feature_matrix(&self) -> FeatureMatrix {
        FeatureMatrix::from_rows(self.rows.iter().map(|r| &r.features))
    }
}
