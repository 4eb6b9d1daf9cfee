//! Execution cost model
//!
//! Pure estimate of slippage and commission for an intended trade. A zero-cost
//! model is constructible only through the explicit [`CostModel::zero`] opt-in.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::{CommissionMode, CostConfig, SlippageMode};

/// Liquidity characteristics of a symbol, from the market-data collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityProfile {
    /// Average daily dollar volume
    pub avg_daily_volume: Decimal,
    /// Typical share/contract price, used for per-unit commission schedules
    pub typical_price: Decimal,
}

impl LiquidityProfile {
    pub fn new(avg_daily_volume: Decimal, typical_price: Decimal) -> Self {
        Self {
            avg_daily_volume,
            typical_price,
        }
    }
}

/// Estimated execution cost for one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    /// Expected slippage in basis points of notional
    pub slippage_bps: Decimal,
    /// Commission in dollars
    pub commission: Decimal,
}

impl CostEstimate {
    /// Total dollar cost for a trade of the given notional
    pub fn total_cost(&self, notional: Decimal) -> Decimal {
        notional * self.slippage_bps / dec!(10000) + self.commission
    }
}

/// Slippage + commission estimator
#[derive(Debug, Clone)]
pub struct CostModel {
    config: CostConfig,
}

impl CostModel {
    /// Build from validated config
    pub fn new(config: CostConfig) -> Self {
        Self { config }
    }

    /// Explicit zero-cost model, for simulations that deliberately ignore costs
    pub fn zero() -> Self {
        Self {
            config: CostConfig {
                slippage_bps: dec!(0),
                commission_rate: dec!(0),
                allow_zero_cost: true,
                ..CostConfig::default()
            },
        }
    }

    /// Estimate slippage and commission for a trade
    pub fn estimate(
        &self,
        notional: Decimal,
        liquidity: &LiquidityProfile,
        volatility: Decimal,
    ) -> CostEstimate {
        let slippage_bps = match self.config.slippage_mode {
            SlippageMode::FixedBps => self.config.slippage_bps,
            SlippageMode::VolumeParticipation => {
                // Square-root impact on participation of average daily volume
                let adv = liquidity.avg_daily_volume.to_f64().unwrap_or(0.0);
                let notional_f = notional.to_f64().unwrap_or(0.0);
                if adv <= 0.0 || notional_f <= 0.0 {
                    self.config.slippage_bps
                } else {
                    let participation = notional_f / adv;
                    let impact_bps = self.config.impact_coefficient * participation.sqrt() * 100.0;
                    let impact =
                        Decimal::from_f64(impact_bps).unwrap_or(self.config.slippage_bps);
                    impact.max(self.config.slippage_bps)
                }
            }
            SlippageMode::VolatilityScaled => {
                let scaled = self.config.vol_slippage_scale * volatility.max(dec!(0));
                scaled.max(self.config.slippage_bps)
            }
        };

        let commission = match self.config.commission_mode {
            CommissionMode::Percentage => notional * self.config.commission_rate,
            CommissionMode::PerShare | CommissionMode::PerContract => {
                if liquidity.typical_price <= dec!(0) {
                    dec!(0)
                } else {
                    let units = notional / liquidity.typical_price;
                    units * self.config.commission_rate
                }
            }
        };

        CostEstimate {
            slippage_bps,
            commission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liquidity() -> LiquidityProfile {
        LiquidityProfile::new(dec!(10000000), dec!(100))
    }

    #[test]
    fn test_fixed_bps_slippage() {
        let model = CostModel::new(CostConfig::default());
        let est = model.estimate(dec!(10000), &liquidity(), dec!(0.01));
        assert_eq!(est.slippage_bps, dec!(5));
        assert_eq!(est.commission, dec!(10)); // 10000 * 0.001
    }

    #[test]
    fn test_total_cost() {
        let est = CostEstimate {
            slippage_bps: dec!(10),
            commission: dec!(5),
        };
        // 10 bps on $10,000 = $10, plus $5 commission
        assert_eq!(est.total_cost(dec!(10000)), dec!(15));
    }

    #[test]
    fn test_volume_participation_grows_with_size() {
        let config = CostConfig {
            slippage_mode: SlippageMode::VolumeParticipation,
            ..CostConfig::default()
        };
        let model = CostModel::new(config);
        let liq = liquidity();

        let small = model.estimate(dec!(10000), &liq, dec!(0.01));
        let large = model.estimate(dec!(1000000), &liq, dec!(0.01));
        assert!(large.slippage_bps > small.slippage_bps);
    }

    #[test]
    fn test_volume_participation_floor() {
        let config = CostConfig {
            slippage_mode: SlippageMode::VolumeParticipation,
            ..CostConfig::default()
        };
        let model = CostModel::new(config);
        // Tiny trade in a deep market still pays at least the base bps
        let est = model.estimate(dec!(10), &liquidity(), dec!(0.01));
        assert!(est.slippage_bps >= dec!(5));
    }

    #[test]
    fn test_volatility_scaled_slippage() {
        let config = CostConfig {
            slippage_mode: SlippageMode::VolatilityScaled,
            ..CostConfig::default()
        };
        let model = CostModel::new(config);

        let calm = model.estimate(dec!(10000), &liquidity(), dec!(0.01));
        let wild = model.estimate(dec!(10000), &liquidity(), dec!(0.10));
        assert_eq!(calm.slippage_bps, dec!(5)); // floor: 100 * 0.01 = 1 < 5
        assert_eq!(wild.slippage_bps, dec!(10)); // 100 * 0.10
    }

    #[test]
    fn test_per_share_commission() {
        let config = CostConfig {
            commission_mode: CommissionMode::PerShare,
            commission_rate: dec!(0.005),
            ..CostConfig::default()
        };
        let model = CostModel::new(config);
        let est = model.estimate(dec!(10000), &liquidity(), dec!(0.01));
        // 100 shares at $0.005 each
        assert_eq!(est.commission, dec!(0.5));
    }

    #[test]
    fn test_zero_model_is_explicit() {
        let model = CostModel::zero();
        let est = model.estimate(dec!(10000), &liquidity(), dec!(0.05));
        assert_eq!(est.slippage_bps, dec!(0));
        assert_eq!(est.commission, dec!(0));
        assert_eq!(est.total_cost(dec!(10000)), dec!(0));
    }

    #[test]
    fn test_default_model_never_zero_cost() {
        let model = CostModel::new(CostConfig::default());
        let est = model.estimate(dec!(10000), &liquidity(), dec!(0));
        assert!(est.total_cost(dec!(10000)) > dec!(0));
    }

    #[test]
    fn test_zero_adv_falls_back_to_base_bps() {
        let config = CostConfig {
            slippage_mode: SlippageMode::VolumeParticipation,
            ..CostConfig::default()
        };
        let model = CostModel::new(config);
        let liq = LiquidityProfile::new(dec!(0), dec!(100));
        let est = model.estimate(dec!(10000), &liq, dec!(0.01));
        assert_eq!(est.slippage_bps, dec!(5));
    }
}
