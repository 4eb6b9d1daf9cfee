//! Performance metrics over a completed simulation
//!
//! Computed once from the trade list and equity curve. Statistics are plain
//! f64; the money stays `Decimal` upstream.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::engine::{EquityPoint, Trade};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Ceiling reported when a run has no losing bars. Keeps serialized records
/// finite: JSON has no representation for infinity.
pub const SORTINO_CAP: f64 = 100.0;

/// Summary statistics for one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Annualized Sharpe ratio of bar-to-bar equity returns
    pub sharpe: f64,
    /// Annualized Sortino ratio (downside deviation denominator)
    pub sortino: f64,
    /// Largest peak-to-trough equity decline, as a fraction
    pub max_drawdown_pct: f64,
    /// Fraction of trades with positive net P&L
    pub win_rate: f64,
    /// Total return over the run, as a fraction of initial capital
    pub total_return_pct: f64,
    pub total_trades: usize,
}

impl PerformanceMetrics {
    /// An all-zero record for runs that produced no activity
    pub fn empty() -> Self {
        Self {
            sharpe: 0.0,
            sortino: 0.0,
            max_drawdown_pct: 0.0,
            win_rate: 0.0,
            total_return_pct: 0.0,
            total_trades: 0,
        }
    }

    pub fn compute(
        initial_capital: Decimal,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
    ) -> Self {
        if equity_curve.is_empty() {
            return Self::empty();
        }

        let equities: Vec<f64> = equity_curve
            .iter()
            .map(|p| p.equity.to_f64().unwrap_or(0.0))
            .collect();
        let initial = initial_capital.to_f64().unwrap_or(0.0);
        let last = *equities.last().unwrap_or(&initial);

        let total_return_pct = if initial > 0.0 {
            (last - initial) / initial
        } else {
            0.0
        };

        let mut returns = Vec::with_capacity(equities.len());
        for pair in equities.windows(2) {
            if pair[0] > 0.0 {
                returns.push(pair[1] / pair[0] - 1.0);
            }
        }

        let winners = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            winners as f64 / trades.len() as f64
        };

        Self {
            sharpe: sharpe_ratio(&returns),
            sortino: sortino_ratio(&returns),
            max_drawdown_pct: max_drawdown(&equities),
            win_rate,
            total_return_pct,
            total_trades: trades.len(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Annualized mean-over-stddev of per-bar returns; zero when undefined
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(returns);
    let var = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let sd = var.sqrt();
    if sd == 0.0 {
        return 0.0;
    }
    m / sd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Like Sharpe, but penalizing only downside deviation
fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(returns);
    let downside: Vec<f64> = returns.iter().filter(|r| **r < 0.0).copied().collect();
    if downside.is_empty() {
        // No losing bars: no downside deviation to divide by
        return if m > 0.0 { SORTINO_CAP } else { 0.0 };
    }
    let dd = (downside.iter().map(|r| r.powi(2)).sum::<f64>() / returns.len() as f64).sqrt();
    if dd == 0.0 {
        return 0.0;
    }
    (m / dd * TRADING_DAYS_PER_YEAR.sqrt()).min(SORTINO_CAP)
}

/// Largest peak-to-trough decline as a positive fraction
fn max_drawdown(equities: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;
    for e in equities {
        peak = peak.max(*e);
        if peak > 0.0 {
            let dd = (peak - e) / peak;
            max_dd = f64::max(max_dd, dd);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn curve(equities: &[f64]) -> Vec<EquityPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        equities
            .iter()
            .enumerate()
            .map(|(i, e)| EquityPoint {
                timestamp: start + Duration::days(i as i64),
                equity: Decimal::try_from(*e).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_empty_curve_gives_empty_metrics() {
        let m = PerformanceMetrics::compute(dec!(100000), &[], &[]);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.sharpe, 0.0);
    }

    #[test]
    fn test_total_return() {
        let m = PerformanceMetrics::compute(
            dec!(100000),
            &[],
            &curve(&[100000.0, 105000.0, 110000.0]),
        );
        assert!((m.total_return_pct - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_max_drawdown() {
        // Peak 120k, trough 90k: 25% drawdown
        let m = PerformanceMetrics::compute(
            dec!(100000),
            &[],
            &curve(&[100000.0, 120000.0, 90000.0, 110000.0]),
        );
        assert!((m.max_drawdown_pct - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_monotone_curve_has_no_drawdown() {
        let m = PerformanceMetrics::compute(
            dec!(100000),
            &[],
            &curve(&[100000.0, 101000.0, 102000.0, 103000.0]),
        );
        assert_eq!(m.max_drawdown_pct, 0.0);
        assert!(m.sharpe > 0.0);
    }

    #[test]
    fn test_sharpe_zero_for_constant_returns() {
        // Identical per-bar returns: zero variance, Sharpe defined as 0
        let equities: Vec<f64> = (0..10).map(|i| 100000.0 * 1.01_f64.powi(i)).collect();
        let m = PerformanceMetrics::compute(dec!(100000), &[], &curve(&equities));
        assert_eq!(m.sharpe, 0.0);
    }

    #[test]
    fn test_sortino_ignores_upside_volatility() {
        // Same mean, but one series takes its volatility on the upside only
        let choppy = vec![0.02, -0.01, 0.02, -0.01, 0.02, -0.01];
        let upside = vec![0.03, 0.0, 0.0, 0.03, 0.0, 0.0];
        assert!(sortino_ratio(&upside) > sortino_ratio(&choppy));
    }

    #[test]
    fn test_loss_free_run_reports_capped_sortino() {
        let m = PerformanceMetrics::compute(
            dec!(100000),
            &[],
            &curve(&[100000.0, 101000.0, 103000.0, 106000.0]),
        );
        assert_eq!(m.sortino, SORTINO_CAP);
        assert!(m.sortino.is_finite());

        // The record must survive a serde round trip
        let json = serde_json::to_string(&m).unwrap();
        let back: PerformanceMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sortino, SORTINO_CAP);
    }

    #[test]
    fn test_win_rate() {
        use crate::backtest::engine::ExitReason;
        use crate::types::Side;
        let trade = |pnl: Decimal| Trade {
            symbol: "AAPL".to_string(),
            side: Side::Long,
            entry_time: Utc::now(),
            exit_time: Utc::now(),
            entry_price: dec!(100),
            exit_price: dec!(101),
            quantity: dec!(10),
            pnl,
            costs: dec!(1),
            exit_reason: ExitReason::Signal,
        };
        let trades = vec![trade(dec!(50)), trade(dec!(-20)), trade(dec!(30)), trade(dec!(-10))];
        let m = PerformanceMetrics::compute(dec!(100000), &trades, &curve(&[100000.0, 100050.0]));
        assert_eq!(m.win_rate, 0.5);
        assert_eq!(m.total_trades, 4);
    }
}
