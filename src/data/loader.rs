//! Loader for the historical price/feature table.
//!
//! Accepts CSV or parquet files. Column names are matched case-insensitively.
//! Required: `price`. Optional: `date` (YYYY-MM-DD or a date column),
//! `label` (0/1 ground truth; any other value leaves that row unlabelled).
//! Every other numeric column becomes a feature.
//! Rows are returned sorted by date ascending when dates are present.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use super::types::{FeatureSet, PriceRow, PriceTable};

pub const PRICE_COLUMN: &str = "price";
pub const LABEL_COLUMN: &str = "label";
pub const DATE_COLUMN: &str = "date";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads price tables from disk.
pub struct DataLoader {
    require_label: bool,
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            require_label: false,
        }
    }

    /// Fail when the table has no `label` column (needed for signal accuracy
    /// or any downstream training step).
    pub fn require_label(mut self, required: bool) -> Self {
        self.require_label = required;
        self
    }

    /// Load a table as a polars DataFrame.
    pub fn load_dataframe(&self, path: &Path) -> Result<DataFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let is_parquet = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("parquet"))
            .unwrap_or(false);

        let lf = if is_parquet {
            LazyFrame::scan_parquet(path, ScanArgsParquet::default())?
        } else {
            LazyCsvReader::new(path)
                .with_has_header(true)
                .with_infer_schema_length(Some(1000))
                .finish()?
        };

        Ok(lf.collect()?)
    }

    /// Load a price table from a CSV or parquet file.
    pub fn load(&self, path: &Path) -> Result<PriceTable, LoaderError> {
        let df = self.load_dataframe(path)?;
        let table = self.table_from_dataframe(&df)?;
        info!(
            rows = table.len(),
            path = %path.display(),
            "Loaded price table"
        );
        Ok(table)
    }

    /// Convert a DataFrame into a price table.
    pub fn table_from_dataframe(&self, df: &DataFrame) -> Result<PriceTable, LoaderError> {
        let height = df.height();

        let mut prices: Option<Vec<Option<f64>>> = None;
        let mut labels: Option<Vec<Option<f64>>> = None;
        let mut dates: Option<Vec<Option<NaiveDate>>> = None;
        let mut feature_columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();

        for series in df.get_columns() {
            let name = series.name().to_lowercase();
            let dtype = series.dtype().clone();

            if name == DATE_COLUMN {
                dates = Some(parse_dates(series)?);
                continue;
            }

            if !(dtype.is_numeric() || dtype == DataType::Boolean) {
                continue;
            }

            let values = numeric_values(series)?;
            match name.as_str() {
                PRICE_COLUMN => {
                    feature_columns.push((name.clone(), values.clone()));
                    prices = Some(values);
                }
                LABEL_COLUMN => labels = Some(values),
                _ => feature_columns.push((name, values)),
            }
        }

        let prices = prices.ok_or_else(|| LoaderError::MissingColumn(PRICE_COLUMN.to_string()))?;

        if labels.is_none() {
            if self.require_label {
                return Err(LoaderError::MissingColumn(LABEL_COLUMN.to_string()));
            }
            warn!("No 'label' column found; signal accuracy will not be computed");
        }

        let mut rows = Vec::with_capacity(height);
        for i in 0..height {
            let price = prices[i].unwrap_or(f64::NAN);

            let mut features = FeatureSet::new();
            for (name, values) in &feature_columns {
                if let Some(v) = values[i] {
                    features.insert(name.clone(), v);
                }
            }

            let label = match labels.as_ref().and_then(|l| l[i]) {
                Some(v) if v == 0.0 => Some(0),
                Some(v) if v == 1.0 => Some(1),
                Some(v) => {
                    warn!(row = i, label = v, "Label must be 0 or 1; leaving row unlabelled");
                    None
                }
                None => None,
            };

            rows.push(PriceRow {
                date: dates.as_ref().and_then(|d| d[i]),
                price,
                label,
                features,
            });
        }

        Ok(PriceTable::new(rows))
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>, LoaderError> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

fn parse_dates(series: &Series) -> Result<Vec<Option<NaiveDate>>, LoaderError> {
    let casted = series.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
        .collect();
    Ok(values)
}
