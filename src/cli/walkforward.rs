//! `riskgate walkforward` subcommand
//!
//! Exits non-zero with the reasons printed when any symbol fails the
//! promotion gate, so CI pipelines can gate deployment on it directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;

use super::{filter_bars, load_bars};
use crate::backtest::{ParamFitter, RollingFitter, WalkForwardValidator};
use crate::config::Config;

#[derive(Args)]
pub struct WalkforwardArgs {
    /// JSON bar file; repeat once per symbol, in the same order
    #[arg(short, long, required = true)]
    pub data: Vec<PathBuf>,

    /// Symbol to validate; repeat the flag to run several
    #[arg(short, long, required = true)]
    pub symbol: Vec<String>,

    /// First trading date to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<chrono::NaiveDate>,

    /// Last trading date to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<chrono::NaiveDate>,

    /// RNG seed; window seeds derive from it deterministically
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Write the walk-forward records as a JSON array to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl WalkforwardArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.symbol.len() == self.data.len(),
            "each --symbol needs a matching --data file, in order ({} symbols, {} files)",
            self.symbol.len(),
            self.data.len()
        );

        let fitter: Arc<dyn ParamFitter> =
            Arc::new(RollingFitter::new(config.clone(), self.seed));
        let validator = WalkForwardValidator::new(config.clone());

        let mut runs = Vec::with_capacity(self.symbol.len());
        let mut failures = Vec::new();
        for (symbol, path) in self.symbol.iter().zip(&self.data) {
            let bars = filter_bars(load_bars(path)?, self.start, self.end)?;
            let run = validator
                .run(symbol, bars, Arc::clone(&fitter), self.seed)
                .await?;

            println!(
                "Walk-forward: {} ({} windows, seed {})",
                run.symbol,
                run.windows.len(),
                run.seed
            );
            for window in &run.windows {
                println!(
                    "  window {}: {} .. {}  IS Sharpe {:.2}  OOS Sharpe {:.2}  trades {}{}",
                    window.index,
                    window.test_start.date_naive(),
                    window.test_end.date_naive(),
                    window.in_sample.sharpe,
                    window.out_of_sample.sharpe,
                    window.out_of_sample.total_trades,
                    if window.overfit { "  [overfit]" } else { "" },
                );
            }
            println!(
                "  mean Sharpe: in-sample {:.2}, out-of-sample {:.2}",
                run.mean_in_sample_sharpe, run.mean_out_of_sample_sharpe
            );

            failures.extend(
                run.promotion_failures(&config.validation)
                    .into_iter()
                    .map(|f| format!("{symbol}: {f}")),
            );
            runs.push(run);
        }

        if let Some(path) = &self.output {
            let json = serde_json::to_string_pretty(&runs)?;
            std::fs::write(path, json)
                .with_context(|| format!("writing walk-forward records to {}", path.display()))?;
            println!("Walk-forward records written to {}", path.display());
        }

        if !failures.is_empty() {
            for failure in &failures {
                eprintln!("FAIL: {failure}");
            }
            bail!("strategy failed the promotion gate");
        }
        println!("PASS: strategy cleared the promotion gate");
        Ok(())
    }
}
