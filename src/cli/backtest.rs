//! `riskgate backtest` subcommand

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;

use super::{filter_bars, load_bars};
use crate::backtest::{BacktestEngine, StrategyParams};
use crate::config::Config;

#[derive(Args)]
pub struct BacktestArgs {
    /// JSON bar file; repeat once per symbol, in the same order
    #[arg(short, long, required = true)]
    pub data: Vec<PathBuf>,

    /// Symbol to test; repeat the flag to run several
    #[arg(short, long, required = true)]
    pub symbol: Vec<String>,

    /// First trading date to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<chrono::NaiveDate>,

    /// Last trading date to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<chrono::NaiveDate>,

    /// Momentum lookback in bars
    #[arg(long, default_value_t = 20)]
    pub lookback: usize,

    /// Entry threshold as a fractional return over the lookback
    #[arg(long, default_value = "0.03")]
    pub threshold: Decimal,

    /// RNG seed for Monte Carlo risk estimation
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Write the run records as a JSON array to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BacktestArgs {
    pub fn execute(&self, config: Config) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.symbol.len() == self.data.len(),
            "each --symbol needs a matching --data file, in order ({} symbols, {} files)",
            self.symbol.len(),
            self.data.len()
        );

        let params = StrategyParams {
            lookback: self.lookback,
            entry_threshold: self.threshold,
            confidence: StrategyParams::default().confidence,
        };
        let engine = BacktestEngine::new(config);

        let mut runs = Vec::with_capacity(self.symbol.len());
        for (symbol, path) in self.symbol.iter().zip(&self.data) {
            let bars = filter_bars(load_bars(path)?, self.start, self.end)?;
            let run = engine.run(symbol, &bars, &params, self.seed)?;

            println!("Backtest: {} ({} bars, seed {})", run.symbol, bars.len(), run.seed);
            println!("  Trades:        {}", run.metrics.total_trades);
            println!("  Win rate:      {:.1}%", run.metrics.win_rate * 100.0);
            println!("  Total return:  {:.2}%", run.metrics.total_return_pct * 100.0);
            println!("  Sharpe:        {:.2}", run.metrics.sharpe);
            println!("  Sortino:       {:.2}", run.metrics.sortino);
            println!("  Max drawdown:  {:.2}%", run.metrics.max_drawdown_pct * 100.0);
            println!("  Final equity:  {}", run.final_equity.round_dp(2));
            runs.push(run);
        }

        if let Some(path) = &self.output {
            let json = serde_json::to_string_pretty(&runs)?;
            std::fs::write(path, json)
                .with_context(|| format!("writing run records to {}", path.display()))?;
            println!("Run records written to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use rust_decimal_macros::dec;

    #[test]
    fn test_repeated_symbol_flags_parse() {
        let cli = Cli::try_parse_from([
            "riskgate", "backtest", "--symbol", "AAPL", "--symbol", "MSFT", "--data",
            "aapl.json", "--data", "msft.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Backtest(args) => {
                assert_eq!(args.symbol, vec!["AAPL", "MSFT"]);
                assert_eq!(
                    args.data,
                    vec![PathBuf::from("aapl.json"), PathBuf::from("msft.json")]
                );
            }
            _ => panic!("expected the backtest subcommand"),
        }
    }

    #[test]
    fn test_mismatched_pairing_is_rejected_before_any_read() {
        // Two symbols, one file: refused up front, so the missing file is
        // never opened
        let args = BacktestArgs {
            data: vec![PathBuf::from("does-not-exist.json")],
            symbol: vec!["AAPL".to_string(), "MSFT".to_string()],
            start: None,
            end: None,
            lookback: 20,
            threshold: dec!(0.03),
            seed: 7,
            output: None,
        };
        let err = args.execute(Config::default()).unwrap_err();
        assert!(err.to_string().contains("matching --data"));
    }
}
