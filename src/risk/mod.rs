//! Portfolio risk validation
//!
//! Checks a candidate sizing decision against the portfolio VaR budget and
//! correlated-exposure limits. Shrinks first; rejects only when shrinking
//! cannot satisfy the budget.

mod var;

pub use var::{correlation, ReturnsHistory, VarEstimator};

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RiskConfig;
use crate::sizing::PositionSizeDecision;
use crate::types::{AccountSnapshot, Side, TradeSignal};

/// Risk validation errors
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Degenerate risk input: {0}")]
    DegenerateInput(String),
}

/// Why a candidate was rejected outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// VaR exceeds the budget even at the minimum size floor
    RiskLimitExceeded,
    /// Correlated-cluster exposure exceeds its cap even at the floor
    CorrelatedExposureExceeded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::RiskLimitExceeded => write!(f, "risk limit exceeded"),
            RejectReason::CorrelatedExposureExceeded => {
                write!(f, "correlated exposure limit exceeded")
            }
        }
    }
}

/// Validation outcome
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Candidate fits the budgets unchanged
    Approved(PositionSizeDecision),
    /// Candidate was shrunk to fit
    Shrunk {
        decision: PositionSizeDecision,
        original_notional: Decimal,
    },
    /// No size at or above the floor fits
    Rejected(RejectReason),
}

/// Validates candidate decisions against portfolio-level risk budgets
#[derive(Debug, Clone)]
pub struct RiskValidator {
    config: RiskConfig,
    estimator: VarEstimator,
    /// Smallest notional worth trading; below this we reject instead of shrinking
    min_size_floor: Decimal,
}

impl RiskValidator {
    pub fn new(config: RiskConfig, min_size_floor: Decimal) -> Self {
        let estimator = VarEstimator::new(&config);
        Self {
            config,
            estimator,
            min_size_floor,
        }
    }

    /// Validate a candidate decision against the proposed portfolio
    pub fn validate(
        &self,
        decision: &PositionSizeDecision,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        history: &ReturnsHistory,
    ) -> Result<Verdict, RiskError> {
        if account.equity <= dec!(0) {
            return Err(RiskError::DegenerateInput(format!(
                "equity must be positive, got {}",
                account.equity
            )));
        }

        let candidate = decision.notional.to_f64().unwrap_or(0.0);
        let floor = self.min_size_floor.to_f64().unwrap_or(0.0);

        let var_allowed = match self.var_allowed_notional(signal, account, candidate, history) {
            VarCheck::Unbounded => candidate,
            VarCheck::Allowed(n) => n,
            VarCheck::BookOverBudget => {
                warn!(
                    symbol = %signal.symbol,
                    "Existing book already exceeds the VaR budget; rejecting new risk"
                );
                return Ok(Verdict::Rejected(RejectReason::RiskLimitExceeded));
            }
        };

        let corr_allowed = self.correlation_allowed_notional(signal, account, history);

        let allowed = candidate.min(var_allowed).min(corr_allowed);

        if allowed >= candidate {
            return Ok(Verdict::Approved(decision.clone()));
        }
        if allowed < floor {
            let reason = if var_allowed < floor {
                RejectReason::RiskLimitExceeded
            } else {
                RejectReason::CorrelatedExposureExceeded
            };
            warn!(
                symbol = %signal.symbol,
                candidate,
                allowed,
                floor,
                %reason,
                "Candidate rejected: no size at or above the floor fits the budget"
            );
            return Ok(Verdict::Rejected(reason));
        }

        let shrunk_notional =
            Decimal::from_f64(allowed).unwrap_or(self.min_size_floor);
        let scale = if decision.notional > dec!(0) {
            shrunk_notional / decision.notional
        } else {
            dec!(0)
        };
        let mut shrunk = decision.clone();
        shrunk.notional = shrunk_notional;
        shrunk.risk_pct_of_equity = decision.risk_pct_of_equity * scale;
        warn!(
            symbol = %signal.symbol,
            original = %decision.notional,
            shrunk = %shrunk.notional,
            "Candidate shrunk to fit the risk budget"
        );
        Ok(Verdict::Shrunk {
            decision: shrunk,
            original_notional: decision.notional,
        })
    }

    /// Largest candidate notional whose proposed-portfolio VaR fits the budget
    fn var_allowed_notional(
        &self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        candidate: f64,
        history: &ReturnsHistory,
    ) -> VarCheck {
        let budget =
            (account.equity * self.config.var_budget_pct).to_f64().unwrap_or(0.0);

        let var_at = |scale: f64| -> Option<f64> {
            let positions = self.signed_positions(signal, account, candidate * scale);
            self.estimator.portfolio_var(&positions, history)
        };

        let full = match var_at(1.0) {
            Some(v) => v,
            None => {
                warn!(
                    symbol = %signal.symbol,
                    "Insufficient return history for VaR; check skipped"
                );
                return VarCheck::Unbounded;
            }
        };
        if full <= budget {
            return VarCheck::Unbounded;
        }

        let base = var_at(0.0).unwrap_or(0.0);
        if base > budget {
            return VarCheck::BookOverBudget;
        }

        // Bisect the candidate scale; VaR is monotone in the candidate's share
        // for any one-sided addition to the book.
        let mut lo = 0.0;
        let mut hi = 1.0;
        for _ in 0..48 {
            let mid = (lo + hi) / 2.0;
            match var_at(mid) {
                Some(v) if v <= budget => lo = mid,
                _ => hi = mid,
            }
        }
        VarCheck::Allowed(candidate * lo)
    }

    /// Candidate notional allowed by the correlated-cluster exposure cap
    fn correlation_allowed_notional(
        &self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        history: &ReturnsHistory,
    ) -> f64 {
        let cap = (account.equity * self.config.max_correlated_pct)
            .to_f64()
            .unwrap_or(0.0);

        let candidate_returns = match history.get(&signal.symbol) {
            Some(r) => r,
            None => {
                debug!(symbol = %signal.symbol, "No return history; correlation check skipped");
                return f64::INFINITY;
            }
        };

        let mut cluster = 0.0;
        for (symbol, position) in &account.open_positions {
            if *symbol == signal.symbol {
                // Same symbol is the tightest possible cluster member
                cluster += (position.quantity * position.entry_price)
                    .to_f64()
                    .unwrap_or(0.0);
                continue;
            }
            let Some(returns) = history.get(symbol) else {
                continue;
            };
            let Some(corr) = correlation(candidate_returns, returns) else {
                continue;
            };
            if corr.abs() >= self.config.correlation_threshold {
                cluster += (position.quantity * position.entry_price)
                    .to_f64()
                    .unwrap_or(0.0);
            }
        }

        (cap - cluster).max(0.0)
    }

    fn signed_positions(
        &self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        candidate: f64,
    ) -> Vec<(String, f64)> {
        let mut positions: Vec<(String, f64)> = account
            .open_positions
            .iter()
            .map(|(symbol, p)| {
                let notional = (p.quantity * p.entry_price).to_f64().unwrap_or(0.0);
                let signed = match p.side {
                    Side::Long => notional,
                    Side::Short => -notional,
                };
                (symbol.clone(), signed)
            })
            .collect();
        positions.sort_by(|a, b| a.0.cmp(&b.0)); // deterministic ordering

        let signed_candidate = match signal.side {
            Side::Long => candidate,
            Side::Short => -candidate,
        };
        match positions.iter_mut().find(|(s, _)| *s == signal.symbol) {
            Some((_, w)) => *w += signed_candidate,
            None => positions.push((signal.symbol.clone(), signed_candidate)),
        }
        positions
    }
}

enum VarCheck {
    /// Full candidate fits, or VaR could not be estimated
    Unbounded,
    /// Largest fitting candidate notional
    Allowed(f64),
    /// Existing book alone exceeds the budget
    BookOverBudget,
}
