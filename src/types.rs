//! Core domain types
//!
//! Shared value types passed between the gate stages. All monetary values are
//! `Decimal`; statistics work in `f64` at the estimator layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// A trade signal from the strategy collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: Side,
    /// Raw signal magnitude, strategy-defined units
    pub strength: Decimal,
    /// Win probability estimate in [0, 1]
    pub confidence: Decimal,
    /// Last traded price at signal time, the stop-loss reference
    pub last_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An open position held in the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
}

impl OpenPosition {
    /// Dollar notional at the entry price
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }
}

/// Point-in-time account state from the broker collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: Decimal,
    pub cash: Decimal,
    pub open_positions: HashMap<String, OpenPosition>,
    /// Realized P&L since the start of the trading day; negative is a loss
    pub daily_realized_pnl: Decimal,
    pub cumulative_drawdown_pct: Decimal,
    /// When the broker produced this snapshot
    pub fetched_at: DateTime<Utc>,
}

impl AccountSnapshot {
    /// Today's realized loss as a positive fraction of equity
    ///
    /// Zero when the day is flat or profitable, or when equity is not
    /// positive (the degenerate case is caught downstream by the sizer).
    pub fn daily_loss_fraction(&self) -> Decimal {
        if self.daily_realized_pnl >= dec!(0) || self.equity <= dec!(0) {
            return dec!(0);
        }
        -self.daily_realized_pnl / self.equity
    }

    /// Sum of absolute open notionals at entry prices
    pub fn gross_exposure(&self) -> Decimal {
        self.open_positions
            .values()
            .map(|p| p.notional().abs())
            .sum()
    }
}

/// One OHLCV bar of historical market data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}
