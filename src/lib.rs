//! riskgate: risk gating and strategy validation for automated trading
//!
//! Every trade signal passes one pipeline before reaching an execution
//! venue: circuit breaker, staleness guard, position sizing, and portfolio
//! risk validation. The same pipeline runs inside the backtest engine, and
//! walk-forward validation decides whether a strategy is promoted to live
//! trading at all.

pub mod backtest;
pub mod breaker;
pub mod cli;
pub mod config;
pub mod cost;
pub mod gate;
pub mod risk;
pub mod sizing;
pub mod staleness;
pub mod telemetry;
pub mod types;
