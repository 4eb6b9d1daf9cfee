//! Rolling walk-forward validation
//!
//! Splits history into contiguous train/test windows, re-fits strategy
//! parameters on each train window, and scores them on the unseen test window
//! that follows. The out-of-sample record, not the in-sample one, decides
//! whether a strategy is promoted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use rust_decimal::Decimal;

use super::engine::{BacktestEngine, BacktestRun, Trade};
use super::metrics::PerformanceMetrics;
use super::{bar_range, validate_bars, BacktestError, StrategyParams};
use crate::config::{Config, ValidationConfig};
use crate::types::Bar;

/// Seam to the parameter-fitting collaborator, called once per train window
pub trait ParamFitter: Send + Sync {
    fn fit(&self, train: &[Bar]) -> StrategyParams;
}

/// Grid-search fitter for the reference momentum strategy
///
/// Scores a small parameter grid on the train window by in-sample Sharpe and
/// keeps the best. Ties go to the first candidate, so fitting is
/// deterministic.
pub struct RollingFitter {
    config: Config,
    seed: u64,
}

impl RollingFitter {
    pub fn new(config: Config, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl ParamFitter for RollingFitter {
    fn fit(&self, train: &[Bar]) -> StrategyParams {
        let engine = BacktestEngine::new(self.config.clone());
        let mut best = StrategyParams::default();
        let mut best_sharpe = f64::NEG_INFINITY;

        for lookback in [10usize, 20, 40] {
            for threshold in [dec!(0.02), dec!(0.03), dec!(0.05)] {
                let candidate = StrategyParams {
                    lookback,
                    entry_threshold: threshold,
                    confidence: dec!(0.7),
                };
                let Ok(run) = engine.run("FIT", train, &candidate, self.seed) else {
                    continue;
                };
                if run.metrics.sharpe > best_sharpe {
                    best_sharpe = run.metrics.sharpe;
                    best = candidate;
                }
            }
        }
        best
    }
}

/// One train/test window and its scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub params: StrategyParams,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub in_sample: PerformanceMetrics,
    pub out_of_sample: PerformanceMetrics,
    /// Out-of-sample Sharpe decayed beyond the configured tolerance
    pub overfit: bool,
}

/// The full walk-forward record for one strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardRun {
    pub symbol: String,
    pub seed: u64,
    pub windows: Vec<WalkForwardWindow>,
    /// Every out-of-sample trade, in window order
    pub trades: Vec<Trade>,
    pub mean_in_sample_sharpe: f64,
    pub mean_out_of_sample_sharpe: f64,
    /// Aggregate decay check over the window means
    pub overfit: bool,
}

impl WalkForwardRun {
    /// Reasons this run fails the promotion gate; empty means promoted
    pub fn promotion_failures(&self, config: &ValidationConfig) -> Vec<String> {
        let mut failures = Vec::new();
        if self.mean_out_of_sample_sharpe < config.min_sharpe {
            failures.push(format!(
                "out-of-sample Sharpe {:.2} below minimum {:.2}",
                self.mean_out_of_sample_sharpe, config.min_sharpe
            ));
        }
        if self.overfit {
            failures.push(format!(
                "out-of-sample Sharpe {:.2} decayed more than {:.0}% from in-sample {:.2}",
                self.mean_out_of_sample_sharpe,
                config.max_sharpe_decay * 100.0,
                self.mean_in_sample_sharpe
            ));
        }
        failures
    }
}

/// Has out-of-sample performance decayed beyond tolerance from in-sample?
pub(crate) fn sharpe_decayed(in_sample: f64, out_of_sample: f64, max_decay: f64) -> bool {
    in_sample > 0.0 && out_of_sample < in_sample * (1.0 - max_decay)
}

/// Contiguous (test_start, test_end) index pairs tiling `[train, n)`
///
/// A trailing remainder shorter than a full test window is absorbed into the
/// final window, so every bar past the first train window is scored exactly
/// once.
pub(crate) fn test_windows(
    n: usize,
    train: usize,
    test: usize,
) -> Result<Vec<(usize, usize)>, BacktestError> {
    if n < train + test {
        return Err(BacktestError::Config(format!(
            "walk-forward needs at least {} bars (train {train} + test {test}), got {n}",
            train + test
        )));
    }
    let mut windows = Vec::new();
    let mut start = train;
    while start < n {
        let mut end = start + test;
        if n - end < test {
            end = n;
        }
        windows.push((start, end));
        start = end;
    }
    Ok(windows)
}

/// Runs walk-forward validation, fanning windows out across blocking workers
pub struct WalkForwardValidator {
    config: Config,
}

impl WalkForwardValidator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        symbol: &str,
        bars: Vec<Bar>,
        fitter: Arc<dyn ParamFitter>,
        seed: u64,
    ) -> Result<WalkForwardRun, BacktestError> {
        validate_bars(&bars)?;
        let train = self.config.validation.train_bars;
        let test = self.config.validation.test_bars;
        let windows = test_windows(bars.len(), train, test)?;
        let max_decay = self.config.validation.max_sharpe_decay;

        info!(
            %symbol,
            windows = windows.len(),
            train,
            test,
            "Starting walk-forward validation"
        );

        let bars: Arc<[Bar]> = bars.into();
        let mut set: JoinSet<Result<(usize, WalkForwardWindow, Vec<Trade>), BacktestError>> =
            JoinSet::new();

        for (index, (test_start, test_end)) in windows.into_iter().enumerate() {
            let bars = Arc::clone(&bars);
            let fitter = Arc::clone(&fitter);
            let config = self.config.clone();
            let symbol = symbol.to_string();
            // Each window gets a distinct, reproducible seed
            let window_seed = seed.wrapping_add(index as u64);

            set.spawn_blocking(move || {
                let window = evaluate_window(
                    &config,
                    &symbol,
                    &bars,
                    fitter.as_ref(),
                    index,
                    test_start,
                    test_end,
                    window_seed,
                    max_decay,
                )?;
                Ok(window)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, window, trades) =
                joined.map_err(|e| BacktestError::Worker(e.to_string()))??;
            results.push((index, window, trades));
        }
        // Workers finish in arbitrary order; the report must not depend on it
        results.sort_by_key(|(index, _, _)| *index);

        let mut windows = Vec::with_capacity(results.len());
        let mut trades = Vec::new();
        for (_, window, mut window_trades) in results {
            if window.overfit {
                warn!(
                    index = window.index,
                    in_sample = window.in_sample.sharpe,
                    out_of_sample = window.out_of_sample.sharpe,
                    "Window flagged as overfit"
                );
            }
            windows.push(window);
            trades.append(&mut window_trades);
        }

        let mean_is = mean(windows.iter().map(|w| w.in_sample.sharpe));
        let mean_oos = mean(windows.iter().map(|w| w.out_of_sample.sharpe));
        let overfit = sharpe_decayed(mean_is, mean_oos, max_decay);

        info!(
            %symbol,
            mean_in_sample_sharpe = mean_is,
            mean_out_of_sample_sharpe = mean_oos,
            overfit,
            trades = trades.len(),
            "Walk-forward validation complete"
        );

        Ok(WalkForwardRun {
            symbol: symbol.to_string(),
            seed,
            windows,
            trades,
            mean_in_sample_sharpe: mean_is,
            mean_out_of_sample_sharpe: mean_oos,
            overfit,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_window(
    config: &Config,
    symbol: &str,
    bars: &[Bar],
    fitter: &dyn ParamFitter,
    index: usize,
    test_start: usize,
    test_end: usize,
    seed: u64,
    max_decay: f64,
) -> Result<(usize, WalkForwardWindow, Vec<Trade>), BacktestError> {
    let train_start = test_start - config.validation.train_bars;
    let train = &bars[train_start..test_start];
    let params = fitter.fit(train);

    let engine = BacktestEngine::new(config.clone());
    let in_sample = engine.run(symbol, train, &params, seed)?.metrics;

    // Lead the test slice with exactly the warmup the engine consumes, so the
    // first tradable bar is the first test bar and no trade leaks backward
    let warmup = BacktestEngine::warmup_bars(&params);
    if warmup >= test_start {
        return Err(BacktestError::Config(format!(
            "warmup {warmup} exceeds available history before test window {index}"
        )));
    }
    let oos_run = engine.run(symbol, &bars[test_start - warmup..test_end], &params, seed)?;
    let out_of_sample =
        test_range_metrics(config.validation.initial_capital, &oos_run, warmup);

    let (train_range_start, train_range_end) = bar_range(train)
        .ok_or_else(|| BacktestError::Config("empty train window".into()))?;
    let (test_range_start, test_range_end) = bar_range(&bars[test_start..test_end])
        .ok_or_else(|| BacktestError::Config("empty test window".into()))?;

    let overfit = sharpe_decayed(in_sample.sharpe, out_of_sample.sharpe, max_decay);
    let window = WalkForwardWindow {
        index,
        params,
        train_start: train_range_start,
        train_end: train_range_end,
        test_start: test_range_start,
        test_end: test_range_end,
        in_sample,
        out_of_sample,
        overfit,
    };
    Ok((index, window, oos_run.trades))
}

/// Metrics over the scored test bars only
///
/// The warmup lead-in holds no positions, so its equity points sit flat at
/// initial capital; scoring them alongside the test bars dilutes every
/// per-window statistic. The first equity point of the run belongs to the
/// second lead-in bar, so skipping `warmup - 1` points lands exactly on the
/// first test bar.
fn test_range_metrics(
    initial_capital: Decimal,
    run: &BacktestRun,
    warmup: usize,
) -> PerformanceMetrics {
    let skip = warmup.saturating_sub(1).min(run.equity_curve.len());
    PerformanceMetrics::compute(initial_capital, &run.trades, &run.equity_curve[skip..])
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}
