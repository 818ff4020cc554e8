//! Parallel runs across symbols.
//!
//! Each symbol gets its own simulator, and with it its own ledger; nothing
//! is shared between runs except the (read-only) inputs.

use rayon::prelude::*;
use tracing::info;

use crate::data::PriceTable;

use super::simulator::{BacktestResult, BacktestSimulator};

/// Run every `(symbol, table)` pair in parallel.
///
/// `build` creates a fresh simulator for a symbol. Results come back in
/// input order.
pub fn run_symbols<F>(inputs: &[(String, PriceTable)], build: F) -> Vec<BacktestResult>
where
    F: Fn(&str) -> BacktestSimulator + Send + Sync,
{
    info!("Running {} symbols in parallel", inputs.len());
    inputs
        .par_iter()
        .map(|(symbol, table)| {
            let mut simulator = build(symbol);
            simulator.run(table)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::backtest::BacktestConfig;
    use crate::data::PriceRow;
    use crate::scoring::{ColumnProbability, TradeScorer};
    use std::sync::Arc;

    fn table(prices: &[f64], probabilities: &[f64]) -> PriceTable {
        PriceTable::new(
            prices
                .iter()
                .zip(probabilities)
                .map(|(&p, &q)| PriceRow::new(p).with_feature("probability", q))
                .collect(),
        )
    }

    #[test]
    fn test_each_symbol_has_its_own_ledger() {
        let inputs = vec![
            (
                "AAA".to_string(),
                table(&[100.0, 101.0, 99.0, 95.0, 110.0], &[0.9, 0.0, 0.9, 0.0, 0.0]),
            ),
            ("BBB".to_string(), table(&[50.0, 52.0, 53.0], &[0.9, 0.0, 0.0])),
            ("CCC".to_string(), table(&[10.0, 11.0], &[0.0, 0.0])),
        ];

        let results = run_symbols(&inputs, |symbol| {
            let model = Arc::new(ColumnProbability::new("probability"));
            let scorer = TradeScorer::new(symbol)
                .with_provider(model.clone())
                .with_sink(Arc::new(MemorySink::new()));
            let config = BacktestConfig {
                symbol: symbol.to_string(),
                ..BacktestConfig::default()
            };
            BacktestSimulator::new(config, scorer).with_signal_model(model)
        });

        let symbols: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(results[0].ledger.closed_positions, 2);
        assert_eq!(results[1].ledger.closed_positions, 1);
        assert_eq!(results[2].ledger.closed_positions, 0);
    }
}
