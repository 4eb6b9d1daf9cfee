//! Fractional Kelly position sizing

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{CapReason, PositionSizeDecision, PositionSizer, SizingError};
use crate::config::SizingConfig;
use crate::types::{AccountSnapshot, Side, TradeSignal};

/// Fractional Kelly sizer
///
/// Kelly edge from signal confidence and the configured payoff ratio:
/// `f* = p - (1 - p) / b`, scaled down by the fractional multiplier
/// (quarter Kelly by default) to avoid over-betting.
#[derive(Debug, Clone)]
pub struct KellySizer {
    config: SizingConfig,
}

impl KellySizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Raw Kelly fraction before the fractional multiplier, floored at zero
    fn raw_kelly(&self, confidence: Decimal) -> Decimal {
        let p = confidence.clamp(dec!(0), dec!(1));
        let q = Decimal::ONE - p;
        let f = p - q / self.config.payoff_ratio;
        f.max(dec!(0))
    }

    fn stop_price(&self, signal: &TradeSignal, distance: Decimal) -> Decimal {
        match signal.side {
            Side::Long => signal.last_price - distance,
            Side::Short => signal.last_price + distance,
        }
    }
}

impl PositionSizer for KellySizer {
    fn size(
        &self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        volatility: Decimal,
    ) -> Result<PositionSizeDecision, SizingError> {
        if account.equity <= dec!(0) {
            return Err(SizingError::NumericDegeneracy(format!(
                "equity must be positive, got {}",
                account.equity
            )));
        }
        if signal.last_price <= dec!(0) {
            return Err(SizingError::NumericDegeneracy(format!(
                "signal price must be positive, got {}",
                signal.last_price
            )));
        }

        let max_notional = account.equity * self.config.max_position_pct;
        let floor = self.config.min_size_floor.min(max_notional);

        // Degenerate volatility: fall back to the floor size and a fixed-percent
        // stop instead of dividing by a zero range.
        if volatility <= dec!(0) {
            let distance = signal.last_price * self.config.fallback_stop_pct;
            return Ok(PositionSizeDecision {
                notional: floor,
                stop_loss_price: self.stop_price(signal, distance),
                risk_pct_of_equity: floor * self.config.fallback_stop_pct / account.equity,
                capped_by: CapReason::MinSizeFloor,
                volatility_substituted: true,
            });
        }

        // f* <= p <= 1 (payoff ratio is positive), so the Kelly product needs
        // no clamp of its own; when neither bound below fires, the edge itself
        // set the size
        let raw = self.raw_kelly(signal.confidence);
        let mut capped_by = CapReason::KellyCap;
        let mut notional = raw * self.config.kelly_fraction * account.equity;

        if notional < floor {
            notional = floor;
            capped_by = CapReason::MinSizeFloor;
        }
        // Hard cap last so the notional invariant always holds
        if notional > max_notional {
            notional = max_notional;
            capped_by = CapReason::MaxPositionPct;
        }

        let distance = self.config.atr_multiplier * volatility;
        let risk_fraction = distance / signal.last_price;

        Ok(PositionSizeDecision {
            notional,
            stop_loss_price: self.stop_price(signal, distance),
            risk_pct_of_equity: notional * risk_fraction / account.equity,
            capped_by,
            volatility_substituted: false,
        })
    }

    fn mode_name(&self) -> &'static str {
        "kelly"
    }
}
