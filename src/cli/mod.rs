//! Command-line interface

pub mod backtest;
pub mod breaker;
pub mod config;
pub mod walkforward;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::Config;
use crate::types::Bar;

#[derive(Parser)]
#[command(name = "riskgate", version, about = "Risk gating and strategy validation")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "riskgate.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single backtest over a bar file
    Backtest(backtest::BacktestArgs),
    /// Run walk-forward validation and the promotion gate
    Walkforward(walkforward::WalkforwardArgs),
    /// Inspect or reset the persisted circuit breaker state
    Breaker(breaker::BreakerArgs),
    /// Show or validate the resolved configuration
    Config(config::ConfigArgs),
}

/// Load the config file, falling back to defaults when it does not exist
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("loading config from {}", path.display()))
    } else {
        debug!(path = %path.display(), "No config file; using defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}

/// Read a JSON array of OHLCV bars from disk
pub fn load_bars(path: &Path) -> anyhow::Result<Vec<Bar>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading bar file {}", path.display()))?;
    let bars: Vec<Bar> = serde_json::from_str(&content)
        .with_context(|| format!("parsing bar file {}", path.display()))?;
    Ok(bars)
}

/// Restrict bars to an optional inclusive date range
pub fn filter_bars(
    bars: Vec<Bar>,
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
) -> anyhow::Result<Vec<Bar>> {
    if let (Some(s), Some(e)) = (start, end) {
        anyhow::ensure!(s <= e, "--start {s} is after --end {e}");
    }
    let bars: Vec<Bar> = bars
        .into_iter()
        .filter(|b| {
            let day = b.timestamp.date_naive();
            start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e)
        })
        .collect();
    anyhow::ensure!(!bars.is_empty(), "no bars remain inside the requested range");
    Ok(bars)
}
