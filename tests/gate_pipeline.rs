//! End-to-end decision pipeline tests

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::tempdir;

use riskgate::breaker::{BreakerStore, CircuitBreaker, Tier};
use riskgate::config::Config;
use riskgate::gate::{Gate, GateError, GateOutcome};
use riskgate::risk::ReturnsHistory;
use riskgate::staleness::StalenessGuard;
use riskgate::types::{AccountSnapshot, Side, TradeSignal};

fn signal() -> TradeSignal {
    TradeSignal {
        symbol: "AAPL".to_string(),
        side: Side::Long,
        strength: dec!(1),
        confidence: dec!(0.8),
        last_price: dec!(100),
        timestamp: Utc::now(),
    }
}

fn account(daily_pnl: Decimal) -> AccountSnapshot {
    AccountSnapshot {
        equity: dec!(100000),
        cash: dec!(100000),
        open_positions: HashMap::new(),
        daily_realized_pnl: daily_pnl,
        cumulative_drawdown_pct: dec!(0),
        fetched_at: Utc::now(),
    }
}

fn history(volatility: f64) -> ReturnsHistory {
    let mut h = ReturnsHistory::new();
    h.insert(
        "AAPL".to_string(),
        (0..250)
            .map(|i| if i % 2 == 0 { volatility } else { -volatility })
            .collect(),
    );
    h
}

#[test]
fn losing_day_walks_down_the_ladder() {
    let mut gate = Gate::from_config(&Config::default());
    let history = history(0.01);

    // Flat morning: full size approved
    let outcome = gate
        .evaluate(&signal(), &account(dec!(0)), dec!(2), dec!(15), &history)
        .unwrap();
    let full = match outcome {
        GateOutcome::Approved(d) => d.notional,
        other => panic!("expected approval, got {other:?}"),
    };
    assert_eq!(full, dec!(2000));

    // 1.2% down: TIER1, candidate halved
    let outcome = gate
        .evaluate(&signal(), &account(dec!(-1200)), dec!(2), dec!(15), &history)
        .unwrap();
    match outcome {
        GateOutcome::Approved(d) => assert_eq!(d.notional, full / dec!(2)),
        other => panic!("expected halved approval, got {other:?}"),
    }

    // 2.3% down: TIER2, entries blocked
    let outcome = gate
        .evaluate(&signal(), &account(dec!(-2300)), dec!(2), dec!(15), &history)
        .unwrap();
    assert!(matches!(
        outcome,
        GateOutcome::EntriesBlocked { tier: Tier::Tier2 }
    ));

    // 3.4% down: TIER3, hard stop
    let err = gate
        .evaluate(&signal(), &account(dec!(-3400)), dec!(2), dec!(15), &history)
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::CircuitBreakerTripped { tier: Tier::Tier3, .. }
    ));

    // Losses recover but the tier holds until someone resets it
    let err = gate
        .evaluate(&signal(), &account(dec!(0)), dec!(2), dec!(15), &history)
        .unwrap_err();
    assert!(matches!(err, GateError::CircuitBreakerTripped { .. }));
}

#[test]
fn tier4_halt_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("breaker_state.json");
    let config = Config::default();
    let guard = StalenessGuard::new(config.staleness.clone());

    {
        let breaker =
            CircuitBreaker::with_store(config.breaker.clone(), BreakerStore::new(&path), &guard)
                .unwrap();
        let mut gate = Gate::with_breaker(&config, breaker);
        let err = gate
            .evaluate(
                &signal(),
                &account(dec!(-6000)),
                dec!(2),
                dec!(15),
                &history(0.01),
            )
            .unwrap_err();
        assert!(err.to_string().contains("TIER4"));
    }

    // Fresh process: the persisted halt is restored, not re-derived
    let breaker =
        CircuitBreaker::with_store(config.breaker.clone(), BreakerStore::new(&path), &guard)
            .unwrap();
    assert_eq!(breaker.state().tier, Tier::Tier4);
    assert!(breaker.state().requires_manual_reset);

    let mut gate = Gate::with_breaker(&config, breaker);
    let err = gate
        .evaluate(&signal(), &account(dec!(0)), dec!(2), dec!(15), &history(0.01))
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::CircuitBreakerTripped { tier: Tier::Tier4, .. }
    ));
}

#[test]
fn oversized_candidate_is_shrunk_not_rejected() {
    // Loosen the per-position cap so VaR becomes the binding constraint
    let mut config = Config::default();
    config.sizing.max_position_pct = dec!(0.5);
    let mut gate = Gate::from_config(&config);

    let outcome = gate
        .evaluate(&signal(), &account(dec!(0)), dec!(2), dec!(15), &history(0.15))
        .unwrap();
    match outcome {
        GateOutcome::Approved(d) => {
            // Quarter-Kelly wants ~16.7% of equity here; a 15% daily sigma
            // against the 2% VaR budget caps the trade near $8k instead
            assert!(d.notional < dec!(12000), "got {}", d.notional);
            assert!(d.notional >= config.sizing.min_size_floor);
        }
        other => panic!("expected shrunk approval, got {other:?}"),
    }
}

#[test]
fn volatility_spike_halts_even_a_profitable_day() {
    let mut gate = Gate::from_config(&Config::default());
    let err = gate
        .evaluate(&signal(), &account(dec!(1500)), dec!(2), dec!(55), &history(0.01))
        .unwrap_err();
    match err {
        GateError::CircuitBreakerTripped { tier, reason, .. } => {
            assert_eq!(tier, Tier::Tier3);
            assert!(reason.contains("volatility"));
        }
        other => panic!("expected breaker trip, got {other:?}"),
    }
}
