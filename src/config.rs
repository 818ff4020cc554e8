//! Engine configuration.
//!
//! Loaded from TOML. Every section and field has a default, so a partial
//! file (or no file) is valid:
//!
//! ```toml
//! [scoring]
//! available_capital = 50000.0
//!
//! [scoring.weights]
//! "DTE" = 0.15
//!
//! [[scoring.overrides]]
//! name = "sizing"
//! threshold = 90.0
//!
//! [backtest]
//! base_holding_days = 3
//!
//! [model]
//! kind = "column"
//! column = "probability"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::AuditSink;
use crate::backtest::{BacktestConfig, BacktestSimulator};
use crate::data::DataLoader;
use crate::scoring::{
    default_overrides, default_weights, ColumnProbability, ConstantProbability, ConvictionScorer,
    LogisticModel, OverrideRule, ProbabilityProvider, RiskAdjuster, RiskConfig, TradeScorer,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub available_capital: f64,
    pub capital_buffer: f64,
    pub max_allocation_pct: f64,
    /// Factor name to weight.
    pub weights: BTreeMap<String, f64>,
    /// Override rules, evaluated in order.
    pub overrides: Vec<OverrideRule>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let risk = RiskConfig::default();
        Self {
            available_capital: risk.available_capital,
            capital_buffer: risk.capital_buffer,
            max_allocation_pct: risk.max_allocation_pct,
            weights: default_weights().into_iter().collect(),
            overrides: default_overrides(),
        }
    }
}

impl ScoringConfig {
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            available_capital: self.available_capital,
            capital_buffer: self.capital_buffer,
            max_allocation_pct: self.max_allocation_pct,
        }
    }

    pub fn conviction_scorer(&self) -> ConvictionScorer {
        ConvictionScorer::new(
            self.weights.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            self.overrides.clone(),
        )
    }
}

/// Probability model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelConfig {
    /// No model: every probability is 0.0.
    None,
    /// Fixed probability.
    Constant { probability: f64 },
    /// Precomputed probability column in the input table.
    Column { column: String },
    /// Logistic model over named features.
    Logistic {
        #[serde(default)]
        intercept: f64,
        #[serde(default)]
        coefficients: BTreeMap<String, f64>,
    },
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Column {
            column: "probability".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn build(&self) -> Option<Arc<dyn ProbabilityProvider>> {
        match self {
            Self::None => None,
            Self::Constant { probability } => Some(Arc::new(ConstantProbability(*probability))),
            Self::Column { column } => Some(Arc::new(ColumnProbability::new(column))),
            Self::Logistic {
                intercept,
                coefficients,
            } => Some(Arc::new(LogisticModel {
                intercept: *intercept,
                coefficients: coefficients.clone(),
            })),
        }
    }
}

/// Input data configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Default input table when none is given on the command line.
    pub path: Option<PathBuf>,
    /// Fail when the table has no `label` column.
    pub require_label: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub backtest: BacktestConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        if !scoring.available_capital.is_finite() || scoring.available_capital < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "available_capital must be non-negative, got {}",
                scoring.available_capital
            )));
        }
        if !(0.0..1.0).contains(&scoring.capital_buffer) {
            return Err(ConfigError::Invalid(format!(
                "capital_buffer must be within [0, 1), got {}",
                scoring.capital_buffer
            )));
        }
        if !(0.0..=1.0).contains(&scoring.max_allocation_pct) {
            return Err(ConfigError::Invalid(format!(
                "max_allocation_pct must be within [0, 1], got {}",
                scoring.max_allocation_pct
            )));
        }
        if let Some((name, weight)) = scoring
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "weight for '{}' must be non-negative, got {}",
                name, weight
            )));
        }
        if let Some(rule) = scoring
            .overrides
            .iter()
            .find(|r| r.threshold.is_some_and(|t| !t.is_finite()))
        {
            return Err(ConfigError::Invalid(format!(
                "override '{}' has a non-finite threshold",
                rule.name
            )));
        }
        if let ModelConfig::Constant { probability } = self.model {
            if !(0.0..=1.0).contains(&probability) {
                return Err(ConfigError::Invalid(format!(
                    "constant probability must be within [0, 1], got {}",
                    probability
                )));
            }
        }
        self.backtest
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn loader(&self) -> DataLoader {
        DataLoader::new().require_label(self.data.require_label)
    }

    /// Trade scorer for `symbol` using the configured model and tables.
    pub fn build_scorer(&self, symbol: &str, sink: Arc<dyn AuditSink>) -> TradeScorer {
        let scorer = TradeScorer::new(symbol)
            .with_conviction(self.scoring.conviction_scorer())
            .with_risk(RiskAdjuster::new(self.scoring.risk_config()))
            .with_sink(sink);
        match self.model.build() {
            Some(model) => scorer.with_provider(model),
            None => scorer,
        }
    }

    /// Simulator for `symbol`. The configured model drives both entry
    /// signals and the scorer's probability.
    pub fn build_simulator(&self, symbol: &str, sink: Arc<dyn AuditSink>) -> BacktestSimulator {
        let config = BacktestConfig {
            symbol: symbol.to_string(),
            ..self.backtest.clone()
        };
        let simulator = BacktestSimulator::new(config, self.build_scorer(symbol, sink));
        match self.model.build() {
            Some(model) => simulator.with_signal_model(model),
            None => simulator,
        }
    }
}
