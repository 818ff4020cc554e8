//! # Run a backtest over one table
//! conviction-backtest run --config engine.toml --data prices.csv
//!
//! # Run several symbols in parallel and print JSON
//! conviction-backtest run --config engine.toml --data nvda.csv --data amd.csv --json
//!
//! # Score a single candidate
//! conviction-backtest score --strike 250 --premium 3.10 --delta -0.25 --side PUT
//!     --underlying 300 --expiry 2024-03-15 --iv-rank 62 --rsi 48
//!
//! # Write the default configuration
//! conviction-backtest init-config engine.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use conviction_backtest::audit::{AuditSink, TracingSink};
use conviction_backtest::backtest::{run_symbols, BacktestResult};
use conviction_backtest::config::EngineConfig;
use conviction_backtest::data::{PriceTable, Side, Trade};
use conviction_backtest::scoring::features::annualized_roc;
use conviction_backtest::scoring::{FactorInputs, RiskAdjuster};

#[derive(Parser)]
#[command(name = "conviction-backtest")]
#[command(about = "Options trade scoring and simulated execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay price tables through the simulator
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input table (CSV or parquet); repeat for several symbols
        #[arg(short, long)]
        data: Vec<PathBuf>,

        /// Offload scoring to the blocking thread pool
        #[arg(long)]
        async_scoring: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a single candidate trade
    Score {
        /// Underlying symbol
        #[arg(long, default_value = "SIM")]
        symbol: String,

        /// Strike price
        #[arg(long)]
        strike: Decimal,

        /// Premium per share
        #[arg(long)]
        premium: Decimal,

        /// Option delta
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        delta: f64,

        /// CALL, PUT or LONG
        #[arg(long, default_value = "PUT")]
        side: String,

        /// Expiration date (YYYY-MM-DD)
        #[arg(long)]
        expiry: Option<String>,

        /// Underlying price (for strike distance)
        #[arg(long)]
        underlying: Option<Decimal>,

        /// Contracts
        #[arg(long, default_value_t = 1)]
        contracts: u32,

        /// IV rank (0-100)
        #[arg(long, default_value_t = 50.0)]
        iv_rank: f64,

        /// RSI of the underlying (0-100)
        #[arg(long, default_value_t = 50.0)]
        rsi: f64,

        /// Earnings fall inside the trade window
        #[arg(long)]
        near_earnings: bool,

        /// Strike sits below the cost basis of held shares
        #[arg(long)]
        below_cost_basis: bool,

        /// Override available capital for the risk penalty
        #[arg(long)]
        available_capital: Option<f64>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Symbol for a table: the configured one for a single file, the file stem
/// otherwise.
fn symbol_for(path: &Path, config: &EngineConfig, multiple: bool) -> String {
    if !multiple {
        return config.backtest.symbol.clone();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| config.backtest.symbol.clone())
}

async fn run(
    config: EngineConfig,
    mut data: Vec<PathBuf>,
    async_scoring: bool,
    json: bool,
) -> Result<()> {
    if data.is_empty() {
        match &config.data.path {
            Some(path) => data.push(path.clone()),
            None => bail!("No input table given (use --data or set [data].path)"),
        }
    }

    let loader = config.loader();
    let multiple = data.len() > 1;
    let mut inputs: Vec<(String, PriceTable)> = Vec::with_capacity(data.len());
    for path in &data {
        let table = loader
            .load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        inputs.push((symbol_for(path, &config, multiple), table));
    }

    let sink: Arc<dyn AuditSink> = Arc::new(TracingSink);
    let results: Vec<BacktestResult> = if async_scoring {
        let mut results = Vec::with_capacity(inputs.len());
        for (symbol, table) in &inputs {
            let mut simulator = config.build_simulator(symbol, Arc::clone(&sink));
            results.push(simulator.run_async(table).await);
        }
        results
    } else if multiple {
        run_symbols(&inputs, |symbol| config.build_simulator(symbol, Arc::clone(&sink)))
    } else {
        inputs
            .iter()
            .map(|(symbol, table)| config.build_simulator(symbol, Arc::clone(&sink)).run(table))
            .collect()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{}\n", result.summary());
        }
    }
    Ok(())
}

/// Market observations for a single scored candidate.
struct MarketInputs {
    iv_rank: f64,
    rsi: f64,
    near_earnings: bool,
    below_cost_basis: bool,
}

#[allow(clippy::too_many_arguments)]
fn score(
    config: EngineConfig,
    symbol: &str,
    strike: Decimal,
    premium: Decimal,
    delta: f64,
    side: &str,
    expiry: Option<&str>,
    underlying: Option<Decimal>,
    contracts: u32,
    market: MarketInputs,
    available_capital: Option<f64>,
) -> Result<()> {
    let side = Side::from_str(side).with_context(|| format!("Invalid side: {}", side))?;

    let mut trade = Trade::new(symbol, strike, side)
        .delta(delta)
        .premium(premium)
        .quantity(contracts);
    if let Some(e) = expiry {
        let date = NaiveDate::parse_from_str(e, "%Y-%m-%d").context("Invalid expiry date format")?;
        trade = trade.expiry(date);
    }
    if let Some(price) = underlying {
        trade = trade.underlying_price(price);
    }

    let inputs = FactorInputs {
        iv_rank: market.iv_rank,
        rsi: market.rsi,
        near_earnings: market.near_earnings,
        above_cost_basis: !market.below_cost_basis,
        ..FactorInputs::from_trade(&trade, chrono::Local::now().date_naive())
    };
    let factors = inputs.to_features();

    let mut config = config;
    if let Some(capital) = available_capital {
        config.scoring.available_capital = capital;
    }

    let scorer = config.build_scorer(symbol, Arc::new(TracingSink));
    let scored = scorer.score_trade(&trade, premium, side, Some(&factors));
    let allocation = scorer.risk().allocation_size();

    println!("{}", serde_json::to_string_pretty(&scored)?);
    if inputs.dte > 0 {
        info!(
            "Annualized ROC: {:.1}%",
            annualized_roc(
                premium.try_into().unwrap_or(0.0),
                strike.try_into().unwrap_or(0.0),
                inputs.dte
            ) * 100.0
        );
    }
    info!(
        "Allocation: ${:.2} ({} contracts)",
        allocation,
        RiskAdjuster::contracts_for_allocation(
            allocation,
            trade.capital_required()
        )
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("conviction_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            async_scoring,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            run(config, data, async_scoring, json).await?;
        }
        Commands::Score {
            symbol,
            strike,
            premium,
            delta,
            side,
            expiry,
            underlying,
            contracts,
            iv_rank,
            rsi,
            near_earnings,
            below_cost_basis,
            available_capital,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            score(
                config,
                &symbol,
                strike,
                premium,
                delta,
                &side,
                expiry.as_deref(),
                underlying,
                contracts,
                MarketInputs {
                    iv_rank,
                    rsi,
                    near_earnings,
                    below_cost_basis,
                },
                available_capital,
            )?;
        }
        Commands::InitConfig { path } => {
            EngineConfig::default()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
