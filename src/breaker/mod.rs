//! Circuit breaker state machine
//!
//! Multi-tier safety ladder driven by realized daily losses and volatility
//! spikes. Tiers only escalate; the single way down is an explicit, logged
//! manual reset. State is persisted after every evaluation so a crash cannot
//! lose a halt.

mod store;

pub use store::BreakerStore;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::BreakerConfig;
use crate::types::AccountSnapshot;

/// Breaker errors
#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("Failed to persist breaker state: {0}")]
    Persist(#[from] std::io::Error),
    #[error("Failed to encode breaker state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Escalation tier, ordered from unrestricted to full halt
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Normal,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Normal => "NORMAL",
            Tier::Tier1 => "TIER1",
            Tier::Tier2 => "TIER2",
            Tier::Tier3 => "TIER3",
            Tier::Tier4 => "TIER4",
        };
        write!(f, "{name}")
    }
}

/// Process-wide breaker state, persisted after every evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub tier: Tier,
    pub tripped_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub requires_manual_reset: bool,
    pub last_evaluated_at: DateTime<Utc>,
}

impl CircuitBreakerState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Normal,
            tripped_at: None,
            reason: None,
            requires_manual_reset: false,
            last_evaluated_at: now,
        }
    }
}

/// The tier state machine
///
/// Single owner of the one piece of shared mutable state in the core; each
/// cycle follows a strict read-evaluate-write-persist sequence.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: CircuitBreakerState,
    store: Option<BreakerStore>,
}

impl CircuitBreaker {
    /// In-memory breaker (backtests, tests)
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitBreakerState::fresh(Utc::now()),
            store: None,
        }
    }

    /// Breaker backed by a durable store; reloads persisted state at startup
    pub fn with_store(
        config: BreakerConfig,
        store: BreakerStore,
        guard: &crate::staleness::StalenessGuard,
    ) -> Result<Self, BreakerError> {
        let state = match store.load(guard)? {
            Some(state) => {
                info!(tier = %state.tier, "Restored persisted breaker state");
                state
            }
            None => CircuitBreakerState::fresh(Utc::now()),
        };
        Ok(Self {
            config,
            state,
            store: Some(store),
        })
    }

    /// Current state
    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    /// Evaluate the snapshot and escalate if any threshold is crossed
    ///
    /// Called once per decision cycle before sizing. Never de-escalates.
    pub fn update(
        &mut self,
        account: &AccountSnapshot,
        volatility_index: Decimal,
    ) -> Result<&CircuitBreakerState, BreakerError> {
        let loss = account.daily_loss_fraction();

        let loss_tier = if loss >= self.config.tier4_loss_pct {
            Tier::Tier4
        } else if loss >= self.config.tier3_loss_pct {
            Tier::Tier3
        } else if loss >= self.config.tier2_loss_pct {
            Tier::Tier2
        } else if loss >= self.config.tier1_loss_pct {
            Tier::Tier1
        } else {
            Tier::Normal
        };

        let vol_tier = if volatility_index >= self.config.vol_spike_threshold {
            Tier::Tier3
        } else {
            Tier::Normal
        };

        let target = loss_tier.max(vol_tier);
        if target > self.state.tier {
            let reason = if vol_tier > loss_tier {
                format!(
                    "volatility index {volatility_index} >= spike threshold {}",
                    self.config.vol_spike_threshold
                )
            } else {
                format!(
                    "daily loss {:.2}% >= {} threshold",
                    loss * Decimal::new(100, 0),
                    target
                )
            };
            warn!(from = %self.state.tier, to = %target, %reason, "Circuit breaker escalated");
            self.state.tier = target;
            self.state.tripped_at = Some(account.fetched_at);
            self.state.reason = Some(reason);
            if target == Tier::Tier4 {
                self.state.requires_manual_reset = true;
                error!(
                    "TIER4 halt: daily loss {:.2}% of equity. All trading stopped; \
                     a manual reset is required before any tier can be re-entered.",
                    loss * Decimal::new(100, 0)
                );
            }
        }
        self.state.last_evaluated_at = account.fetched_at;
        self.persist()?;
        Ok(&self.state)
    }

    /// Explicit external reset, the only downward transition
    pub fn reset(
        &mut self,
        actor: &str,
        reason: &str,
    ) -> Result<&CircuitBreakerState, BreakerError> {
        info!(
            actor,
            reason,
            from = %self.state.tier,
            "Circuit breaker manually reset"
        );
        self.state = CircuitBreakerState::fresh(Utc::now());
        self.persist()?;
        Ok(&self.state)
    }

    /// Candidate size multiplier for the current tier
    pub fn size_multiplier(&self) -> Decimal {
        match self.state.tier {
            Tier::Normal => Decimal::ONE,
            Tier::Tier1 => self.config.tier1_size_multiplier,
            _ => Decimal::ZERO,
        }
    }

    /// New entries are allowed at NORMAL and TIER1 only
    pub fn allows_new_entries(&self) -> bool {
        self.state.tier <= Tier::Tier1
    }

    /// Managing or closing existing positions is allowed below TIER4
    pub fn allows_position_management(&self) -> bool {
        self.state.tier < Tier::Tier4
    }

    /// TIER3 and above: no new risk-taking actions of any kind
    pub fn is_hard_stopped(&self) -> bool {
        self.state.tier >= Tier::Tier3
    }

    fn persist(&self) -> Result<(), BreakerError> {
        if let Some(store) = &self.store {
            store.persist(&self.state)?;
        }
        Ok(())
    }
}
