//! Position sizing module
//!
//! Converts a trade signal into a bounded notional and stop-loss distance.

mod kelly;

pub use kelly::KellySizer;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountSnapshot, TradeSignal};

/// Sizing errors
#[derive(Debug, Error)]
pub enum SizingError {
    /// Inputs from which no meaningful size can be computed
    #[error("Degenerate sizing input: {0}")]
    NumericDegeneracy(String),
}

/// Which bound shaped the final notional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapReason {
    /// No bound recorded; for decisions assembled outside a sizer
    None,
    /// The Kelly edge itself set the size and no later bound fired
    KellyCap,
    /// The max-position-percent cap bit
    MaxPositionPct,
    /// The minimum size floor lifted the notional
    MinSizeFloor,
}

/// A sizing decision, created fresh per decision cycle and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizeDecision {
    /// Dollar notional to trade
    pub notional: Decimal,
    /// Volatility-adjusted stop-loss price
    pub stop_loss_price: Decimal,
    /// Dollar risk at the stop as a fraction of equity
    pub risk_pct_of_equity: Decimal,
    /// Which bound bit, if any
    pub capped_by: CapReason,
    /// True when a fallback stop was substituted for degenerate volatility
    pub volatility_substituted: bool,
}

/// Trait for position sizing implementations
pub trait PositionSizer: Send + Sync {
    /// Compute a candidate decision from a signal, account snapshot, and
    /// volatility estimate (average true range in price units)
    fn size(
        &self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        volatility: Decimal,
    ) -> Result<PositionSizeDecision, SizingError>;

    /// Sizing mode name
    fn mode_name(&self) -> &'static str;
}
