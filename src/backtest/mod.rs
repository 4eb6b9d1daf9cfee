//! Offline simulation harness
//!
//! Replays historical bars through the same gate pipeline used live, and
//! certifies strategies with rolling walk-forward validation before they are
//! allowed to trade real capital.

mod engine;
mod metrics;
mod walkforward;

pub use engine::{BacktestEngine, BacktestRun, EquityPoint, ExitReason, Trade};
pub use metrics::PerformanceMetrics;
pub use walkforward::{
    ParamFitter, RollingFitter, WalkForwardRun, WalkForwardValidator, WalkForwardWindow,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::GateError;
use crate::types::{Bar, Side, TradeSignal};

/// Backtest errors
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Invalid inputs caught before simulation starts
    #[error("Invalid backtest input: {0}")]
    Config(String),
    /// A fatal gate error that is not part of normal simulation flow
    #[error(transparent)]
    Gate(#[from] GateError),
    /// A walk-forward worker panicked or was cancelled
    #[error("Walk-forward worker failed: {0}")]
    Worker(String),
}

/// Strategy parameters re-fit per walk-forward train window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyParams {
    /// Momentum lookback in bars
    pub lookback: usize,
    /// Absolute return over the lookback that triggers an entry
    pub entry_threshold: Decimal,
    /// Confidence attached to generated signals
    pub confidence: Decimal,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            entry_threshold: dec!(0.03),
            confidence: dec!(0.7),
        }
    }
}

/// Seam to the external signal-generation collaborator
///
/// The engine calls this once per bar with the history up to and including
/// that bar; the implementation sees no future data.
pub trait SignalGenerator: Send + Sync {
    fn on_bar(&mut self, symbol: &str, history: &[Bar]) -> Option<TradeSignal>;
}

/// Reference momentum signaler used by the validation CLI and tests
///
/// Goes long when the lookback return exceeds the entry threshold, short when
/// it falls below the negative threshold. Deliberately simple; production
/// strategies live outside this crate and plug in through [`SignalGenerator`].
pub struct MomentumSignaler {
    params: StrategyParams,
}

impl MomentumSignaler {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }
}

impl SignalGenerator for MomentumSignaler {
    fn on_bar(&mut self, symbol: &str, history: &[Bar]) -> Option<TradeSignal> {
        if history.len() <= self.params.lookback {
            return None;
        }
        let current = history.last()?;
        let reference = &history[history.len() - 1 - self.params.lookback];
        if reference.close <= dec!(0) {
            return None;
        }
        let momentum = current.close / reference.close - Decimal::ONE;

        let side = if momentum >= self.params.entry_threshold {
            Side::Long
        } else if momentum <= -self.params.entry_threshold {
            Side::Short
        } else {
            return None;
        };

        Some(TradeSignal {
            symbol: symbol.to_string(),
            side,
            strength: momentum.abs(),
            confidence: self.params.confidence,
            last_price: current.close,
            timestamp: current.timestamp,
        })
    }
}

/// Validate bars before simulation: non-empty, strictly increasing timestamps
pub(crate) fn validate_bars(bars: &[Bar]) -> Result<(), BacktestError> {
    if bars.is_empty() {
        return Err(BacktestError::Config("no historical bars provided".into()));
    }
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(BacktestError::Config(format!(
                "non-monotonic timestamps: {} followed by {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }
    }
    Ok(())
}

/// Inclusive-exclusive time range of a bar slice
pub(crate) fn bar_range(bars: &[Bar]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    Some((bars.first()?.timestamp, bars.last()?.timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::try_from(*c).unwrap();
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close * dec!(1.01),
                    low: close * dec!(0.99),
                    close,
                    volume: dec!(1000000),
                }
            })
            .collect()
    }

    #[test]
    fn test_validate_bars_empty() {
        assert!(matches!(
            validate_bars(&[]),
            Err(BacktestError::Config(_))
        ));
    }

    #[test]
    fn test_validate_bars_non_monotonic() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars[2].timestamp = bars[0].timestamp;
        assert!(validate_bars(&bars).is_err());
    }

    #[test]
    fn test_validate_bars_ok() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        assert!(validate_bars(&bars).is_ok());
    }

    #[test]
    fn test_momentum_signaler_long() {
        let params = StrategyParams {
            lookback: 2,
            entry_threshold: dec!(0.03),
            confidence: dec!(0.7),
        };
        let mut signaler = MomentumSignaler::new(params);
        let bars = make_bars(&[100.0, 102.0, 105.0]);
        let signal = signaler.on_bar("AAPL", &bars).unwrap();
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.last_price, dec!(105));
    }

    #[test]
    fn test_momentum_signaler_short() {
        let params = StrategyParams {
            lookback: 2,
            entry_threshold: dec!(0.03),
            confidence: dec!(0.7),
        };
        let mut signaler = MomentumSignaler::new(params);
        let bars = make_bars(&[100.0, 98.0, 95.0]);
        let signal = signaler.on_bar("AAPL", &bars).unwrap();
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_momentum_signaler_flat_market() {
        let mut signaler = MomentumSignaler::new(StrategyParams::default());
        let bars = make_bars(&[100.0; 40]);
        assert!(signaler.on_bar("AAPL", &bars).is_none());
    }

    #[test]
    fn test_momentum_signaler_needs_lookback() {
        let mut signaler = MomentumSignaler::new(StrategyParams::default());
        let bars = make_bars(&[100.0, 105.0]);
        assert!(signaler.on_bar("AAPL", &bars).is_none());
    }
}
