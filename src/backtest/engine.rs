//! Bar-replay simulation engine
//!
//! Every simulated decision runs through [`Gate::evaluate`], the same pipeline
//! live trading uses, so a strategy cannot pass validation on logic it will
//! never see in production. Runs are deterministic for identical
//! (bars, params, seed) inputs.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metrics::PerformanceMetrics;
use super::{validate_bars, BacktestError, MomentumSignaler, SignalGenerator, StrategyParams};
use crate::breaker::Tier;
use crate::config::Config;
use crate::cost::{CostModel, LiquidityProfile};
use crate::gate::{Gate, GateError, GateOutcome};
use crate::risk::ReturnsHistory;
use crate::types::{AccountSnapshot, Bar, OpenPosition, Side};

/// Bars of true range averaged for the volatility estimate
const ATR_PERIOD: usize = 14;
/// Bars of returns in the realized-volatility index proxy
const VOL_INDEX_WINDOW: usize = 20;

/// One completed simulated trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    /// Net of slippage and commission on both legs
    pub pnl: Decimal,
    /// Total execution cost paid across both legs
    pub costs: Decimal,
    pub exit_reason: ExitReason,
}

/// Why a simulated position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Signal,
    EndOfData,
}

/// Mark-to-market equity at one bar close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// The full result of one simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub symbol: String,
    pub params: StrategyParams,
    pub seed: u64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub final_equity: Decimal,
}

struct SimPosition {
    side: Side,
    quantity: Decimal,
    entry_price: Decimal,
    stop_loss: Decimal,
    entry_time: DateTime<Utc>,
    entry_commission: Decimal,
    entry_slip: Decimal,
}

/// Replays bars through the live gate pipeline
pub struct BacktestEngine {
    config: Config,
}

impl BacktestEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bars consumed before the first decision: signal lookback plus the
    /// volatility estimation window
    pub fn warmup_bars(params: &StrategyParams) -> usize {
        ATR_PERIOD.max(params.lookback) + 1
    }

    /// Run the reference momentum strategy over the bars
    pub fn run(
        &self,
        symbol: &str,
        bars: &[Bar],
        params: &StrategyParams,
        seed: u64,
    ) -> Result<BacktestRun, BacktestError> {
        let mut signaler = MomentumSignaler::new(params.clone());
        self.run_with(symbol, bars, &mut signaler, params, seed)
    }

    /// Run an arbitrary signal generator over the bars
    pub fn run_with(
        &self,
        symbol: &str,
        bars: &[Bar],
        signaler: &mut dyn SignalGenerator,
        params: &StrategyParams,
        seed: u64,
    ) -> Result<BacktestRun, BacktestError> {
        validate_bars(bars)?;
        let warmup = Self::warmup_bars(params);
        if bars.len() <= warmup {
            return Err(BacktestError::Config(format!(
                "need more than {warmup} bars for warmup, got {}",
                bars.len()
            )));
        }

        // The run seed drives Monte Carlo VaR inside the validator
        let mut config = self.config.clone();
        config.risk.mc_seed = seed;

        let mut gate = Gate::from_config(&config);
        let cost_model = CostModel::new(config.cost.clone());
        let initial_capital = config.validation.initial_capital;

        let mut cash = initial_capital;
        let mut position: Option<SimPosition> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());
        let mut daily_realized = dec!(0);
        let mut current_day: Option<NaiveDate> = None;
        let mut peak_equity = initial_capital;
        let mut history = ReturnsHistory::new();
        history.insert(symbol.to_string(), Vec::with_capacity(bars.len()));

        for i in 1..bars.len() {
            let bar = &bars[i];
            let prev_close = bars[i - 1].close;
            if prev_close > dec!(0) {
                let r = (bar.close / prev_close - Decimal::ONE)
                    .to_f64()
                    .unwrap_or(0.0);
                if let Some(returns) = history.get_mut(symbol) {
                    returns.push(r);
                }
            }

            // New trading day: realized P&L resets, and any loss-driven tier
            // below TIER4 re-arms. A TIER4 halt holds until the run ends.
            let day = bar.timestamp.date_naive();
            if current_day != Some(day) {
                if current_day.is_some() {
                    daily_realized = dec!(0);
                    let tier = gate.breaker_state().tier;
                    if tier > Tier::Normal && tier < Tier::Tier4 {
                        gate.reset_breaker("simulator", "new trading day")
                            .map_err(GateError::from)?;
                    }
                }
                current_day = Some(day);
            }

            let volatility = average_true_range(&bars[..=i], ATR_PERIOD);
            let vol_fraction = if bar.close > dec!(0) {
                volatility / bar.close
            } else {
                dec!(0)
            };
            let liquidity = LiquidityProfile::new(bar.volume * bar.close, bar.close);

            // Stop-loss fires if the bar's range crosses the stored stop
            let stopped = position.as_ref().is_some_and(|open| match open.side {
                Side::Long => bar.low <= open.stop_loss,
                Side::Short => bar.high >= open.stop_loss,
            });
            if stopped {
                if let Some(open) = position.take() {
                    let realized = close_position(
                        &open,
                        open.stop_loss,
                        bar.timestamp,
                        ExitReason::StopLoss,
                        &cost_model,
                        &liquidity,
                        vol_fraction,
                        symbol,
                        &mut trades,
                    );
                    cash += realized;
                    daily_realized += realized;
                    debug!(%symbol, pnl = %realized, "Stop-loss triggered");
                }
            }

            let unrealized = position
                .as_ref()
                .map(|p| direction(p.side) * (bar.close - p.entry_price) * p.quantity)
                .unwrap_or(dec!(0));
            let equity = cash + unrealized;
            peak_equity = peak_equity.max(equity);
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity,
            });

            if equity <= dec!(0) {
                warn!(%symbol, %equity, "Equity exhausted; ending simulation early");
                break;
            }
            if i < warmup {
                continue;
            }

            let Some(signal) = signaler.on_bar(symbol, &bars[..=i]) else {
                continue;
            };

            let account = account_snapshot(
                symbol,
                &position,
                equity,
                cash,
                daily_realized,
                peak_equity,
                bar.timestamp,
            );
            let vol_index =
                realized_vol_index(history.get(symbol).map(Vec::as_slice).unwrap_or_default());

            let outcome = match gate.evaluate(&signal, &account, volatility, vol_index, &history) {
                Ok(outcome) => outcome,
                // A hard stop is a normal simulation event; trading resumes
                // when the breaker re-arms at the next day boundary
                Err(GateError::CircuitBreakerTripped { tier, .. }) => {
                    debug!(%symbol, %tier, "Decision suppressed by circuit breaker");
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            match outcome {
                GateOutcome::Approved(decision) => {
                    if position.is_some() {
                        // One position per symbol; same-side signals are ignored
                        continue;
                    }
                    let est = cost_model.estimate(decision.notional, &liquidity, vol_fraction);
                    let slip = est.slippage_bps / dec!(10000);
                    let exec_price = match signal.side {
                        Side::Long => bar.close * (Decimal::ONE + slip),
                        Side::Short => bar.close * (Decimal::ONE - slip),
                    };
                    if exec_price <= dec!(0) {
                        continue;
                    }
                    let quantity = decision.notional / exec_price;
                    cash -= est.commission;
                    daily_realized -= est.commission;
                    let slip_cost = (exec_price - bar.close).abs() * quantity;
                    position = Some(SimPosition {
                        side: signal.side,
                        quantity,
                        entry_price: exec_price,
                        stop_loss: decision.stop_loss_price,
                        entry_time: bar.timestamp,
                        entry_commission: est.commission,
                        entry_slip: slip_cost,
                    });
                    debug!(
                        %symbol,
                        side = %signal.side,
                        notional = %decision.notional,
                        stop = %decision.stop_loss_price,
                        "Opened simulated position"
                    );
                }
                GateOutcome::ManagementPermitted => {
                    if let Some(open) = position.take() {
                        let realized = close_position(
                            &open,
                            bar.close,
                            bar.timestamp,
                            ExitReason::Signal,
                            &cost_model,
                            &liquidity,
                            vol_fraction,
                            symbol,
                            &mut trades,
                        );
                        cash += realized;
                        daily_realized += realized;
                    }
                }
                GateOutcome::EntriesBlocked { tier } => {
                    debug!(%symbol, %tier, "Entry blocked by breaker tier");
                }
                GateOutcome::RiskRejected(reason) => {
                    debug!(%symbol, %reason, "Candidate rejected by risk validation");
                }
            }
        }

        // Flatten any open position at the final close
        if let Some(open) = position.take() {
            let last = bars
                .last()
                .ok_or_else(|| BacktestError::Config("no historical bars provided".into()))?;
            let liquidity = LiquidityProfile::new(last.volume * last.close, last.close);
            let vol_fraction = if last.close > dec!(0) {
                average_true_range(bars, ATR_PERIOD) / last.close
            } else {
                dec!(0)
            };
            let realized = close_position(
                &open,
                last.close,
                last.timestamp,
                ExitReason::EndOfData,
                &cost_model,
                &liquidity,
                vol_fraction,
                symbol,
                &mut trades,
            );
            cash += realized;
            if let Some(point) = equity_curve.last_mut() {
                point.equity = cash;
            }
        }

        let final_equity = equity_curve.last().map(|p| p.equity).unwrap_or(cash);
        let metrics = PerformanceMetrics::compute(initial_capital, &trades, &equity_curve);
        info!(
            %symbol,
            trades = trades.len(),
            %final_equity,
            sharpe = metrics.sharpe,
            "Backtest complete"
        );

        Ok(BacktestRun {
            symbol: symbol.to_string(),
            params: params.clone(),
            seed,
            trades,
            equity_curve,
            metrics,
            final_equity,
        })
    }
}

fn direction(side: Side) -> Decimal {
    match side {
        Side::Long => dec!(1),
        Side::Short => dec!(-1),
    }
}

/// Close a position at the given mark, applying exit costs, and record the
/// trade. Returns (realized exit P&L, same value as the cash delta); the
/// entry commission was already charged when the position opened.
#[allow(clippy::too_many_arguments)]
fn close_position(
    open: &SimPosition,
    mark: Decimal,
    exit_time: DateTime<Utc>,
    exit_reason: ExitReason,
    cost_model: &CostModel,
    liquidity: &LiquidityProfile,
    vol_fraction: Decimal,
    symbol: &str,
    trades: &mut Vec<Trade>,
) -> Decimal {
    let notional = open.quantity * mark;
    let est = cost_model.estimate(notional, liquidity, vol_fraction);
    let slip = est.slippage_bps / dec!(10000);
    // Exit slippage is adverse: below the mark for longs, above for shorts
    let exec_price = match open.side {
        Side::Long => mark * (Decimal::ONE - slip),
        Side::Short => mark * (Decimal::ONE + slip),
    };
    // Slippage on both legs is already embedded in the execution prices
    let gross = direction(open.side) * (exec_price - open.entry_price) * open.quantity;
    let exit_slip_cost = (exec_price - mark).abs() * open.quantity;
    let realized = gross - est.commission;

    trades.push(Trade {
        symbol: symbol.to_string(),
        side: open.side,
        entry_time: open.entry_time,
        exit_time,
        entry_price: open.entry_price,
        exit_price: exec_price,
        quantity: open.quantity,
        pnl: realized - open.entry_commission,
        costs: open.entry_commission + open.entry_slip + est.commission + exit_slip_cost,
        exit_reason,
    });

    realized
}

#[allow(clippy::too_many_arguments)]
fn account_snapshot(
    symbol: &str,
    position: &Option<SimPosition>,
    equity: Decimal,
    cash: Decimal,
    daily_realized: Decimal,
    peak_equity: Decimal,
    now: DateTime<Utc>,
) -> AccountSnapshot {
    let mut open_positions = HashMap::new();
    if let Some(p) = position {
        open_positions.insert(
            symbol.to_string(),
            OpenPosition {
                side: p.side,
                quantity: p.quantity,
                entry_price: p.entry_price,
                stop_loss: p.stop_loss,
            },
        );
    }
    let drawdown = if peak_equity > dec!(0) {
        ((peak_equity - equity) / peak_equity).max(dec!(0))
    } else {
        dec!(0)
    };
    AccountSnapshot {
        equity,
        cash,
        open_positions,
        daily_realized_pnl: daily_realized,
        cumulative_drawdown_pct: drawdown,
        fetched_at: now,
    }
}

/// Simple moving average of true range over the trailing period
fn average_true_range(bars: &[Bar], period: usize) -> Decimal {
    if bars.len() < 2 {
        return dec!(0);
    }
    let start = bars.len().saturating_sub(period).max(1);
    let mut sum = dec!(0);
    let mut count = dec!(0);
    for i in start..bars.len() {
        let prev_close = bars[i - 1].close;
        let tr = (bars[i].high - bars[i].low)
            .max((bars[i].high - prev_close).abs())
            .max((bars[i].low - prev_close).abs());
        sum += tr;
        count += dec!(1);
    }
    if count > dec!(0) {
        sum / count
    } else {
        dec!(0)
    }
}

/// Annualized realized volatility of the trailing returns, in index points
/// (e.g. 20.0 for 20% annualized), as a proxy for an external volatility index
fn realized_vol_index(returns: &[f64]) -> Decimal {
    let window = &returns[returns.len().saturating_sub(VOL_INDEX_WINDOW)..];
    if window.len() < 2 {
        return dec!(0);
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let var = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (window.len() - 1) as f64;
    let annualized = var.sqrt() * (252.0_f64).sqrt() * 100.0;
    Decimal::from_f64(annualized).unwrap_or(dec!(0))
}
