//! Live decision gate
//!
//! One decision cycle: circuit breaker -> staleness guard -> sizer ->
//! validator. The backtest engine drives this same pipeline, so simulated and
//! live decisions share one code path.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::breaker::{BreakerError, CircuitBreaker, CircuitBreakerState, Tier};
use crate::config::Config;
use crate::risk::{RejectReason, ReturnsHistory, RiskError, RiskValidator, Verdict};
use crate::sizing::{KellySizer, PositionSizeDecision, PositionSizer, SizingError};
use crate::staleness::{StalenessError, StalenessGuard};
use crate::types::{AccountSnapshot, TradeSignal};

/// Fatal gate errors; these abort the decision cycle
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    ExpiredData(#[from] StalenessError),
    #[error(
        "Circuit breaker at {tier}: {reason}. {action}"
    )]
    CircuitBreakerTripped {
        tier: Tier,
        reason: String,
        action: &'static str,
    },
    #[error(transparent)]
    Sizing(#[from] SizingError),
    #[error(transparent)]
    Risk(#[from] RiskError),
    #[error(transparent)]
    Breaker(#[from] BreakerError),
}

/// What the signal is trying to do to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeIntent {
    /// Opens or adds to directional exposure
    OpenNew,
    /// Reduces or closes an existing position
    ManageExisting,
}

impl TradeIntent {
    /// Classify a signal against the current book
    pub fn classify(signal: &TradeSignal, account: &AccountSnapshot) -> Self {
        match account.open_positions.get(&signal.symbol) {
            Some(position) if position.side == signal.side.opposite() => {
                TradeIntent::ManageExisting
            }
            _ => TradeIntent::OpenNew,
        }
    }
}

/// Non-fatal outcome of a decision cycle
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Candidate approved for execution
    Approved(PositionSizeDecision),
    /// Management of an existing position is permitted; execution decides size
    ManagementPermitted,
    /// New entries are blocked at the current tier
    EntriesBlocked { tier: Tier },
    /// Risk validation rejected the candidate
    RiskRejected(RejectReason),
}

/// The decision pipeline, single owner of the circuit breaker
pub struct Gate {
    breaker: CircuitBreaker,
    guard: StalenessGuard,
    sizer: Box<dyn PositionSizer>,
    validator: RiskValidator,
}

impl Gate {
    /// Build a gate with an in-memory breaker (backtests, tests)
    pub fn from_config(config: &Config) -> Self {
        Self::with_breaker(config, CircuitBreaker::new(config.breaker.clone()))
    }

    /// Build a gate around an existing breaker (e.g. one restored from disk)
    pub fn with_breaker(config: &Config, breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            guard: StalenessGuard::new(config.staleness.clone()),
            sizer: Box::new(KellySizer::new(config.sizing.clone())),
            validator: RiskValidator::new(config.risk.clone(), config.sizing.min_size_floor),
        }
    }

    /// Current breaker state, for status display
    pub fn breaker_state(&self) -> &CircuitBreakerState {
        self.breaker.state()
    }

    /// Manual breaker reset passthrough
    pub fn reset_breaker(
        &mut self,
        actor: &str,
        reason: &str,
    ) -> Result<&CircuitBreakerState, BreakerError> {
        self.breaker.reset(actor, reason)
    }

    /// Run one decision cycle
    pub fn evaluate(
        &mut self,
        signal: &TradeSignal,
        account: &AccountSnapshot,
        volatility: Decimal,
        volatility_index: Decimal,
        history: &ReturnsHistory,
    ) -> Result<GateOutcome, GateError> {
        // 1. An existing hard stop aborts before anything else runs
        if self.breaker.is_hard_stopped() {
            return Err(self.hard_stop_error());
        }

        // 2. Refuse expired snapshots before they feed the breaker: a stale
        //    loss figure must never latch an escalation
        let meta = self.guard.classify(account.fetched_at, signal.timestamp);
        self.guard.guard(&meta)?;

        // 3. Breaker escalation from the now-trusted snapshot
        self.breaker.update(account, volatility_index)?;
        if self.breaker.is_hard_stopped() {
            return Err(self.hard_stop_error());
        }

        // 4. Intent: management stays allowed through TIER2
        let intent = TradeIntent::classify(signal, account);
        if intent == TradeIntent::ManageExisting {
            return Ok(GateOutcome::ManagementPermitted);
        }
        if !self.breaker.allows_new_entries() {
            return Ok(GateOutcome::EntriesBlocked {
                tier: self.breaker.state().tier,
            });
        }

        // 5. Size, applying the tier multiplier before validation
        let mut decision = self.sizer.size(signal, account, volatility)?;
        let multiplier = self.breaker.size_multiplier();
        if multiplier < Decimal::ONE {
            warn!(
                tier = %self.breaker.state().tier,
                %multiplier,
                "Tier restriction shrinking candidate size"
            );
            decision.notional *= multiplier;
            decision.risk_pct_of_equity *= multiplier;
        }

        // 6. Portfolio-level validation: shrink first, reject only at the floor
        match self
            .validator
            .validate(&decision, signal, account, history)?
        {
            Verdict::Approved(decision) => Ok(GateOutcome::Approved(decision)),
            Verdict::Shrunk { decision, .. } => Ok(GateOutcome::Approved(decision)),
            Verdict::Rejected(reason) => Ok(GateOutcome::RiskRejected(reason)),
        }
    }

    fn hard_stop_error(&self) -> GateError {
        let state = self.breaker.state();
        let action = if state.tier == Tier::Tier4 {
            "Full halt; a manual reset is required to resume trading."
        } else {
            "No new risk-taking actions until losses or volatility recede."
        };
        GateError::CircuitBreakerTripped {
            tier: state.tier,
            reason: state
                .reason
                .clone()
                .unwrap_or_else(|| "threshold crossed".to_string()),
            action,
        }
    }
}
