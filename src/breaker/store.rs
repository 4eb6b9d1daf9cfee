//! Durable breaker state record
//!
//! One small JSON record written atomically (temp file + rename) after every
//! evaluation. On load the record's age is re-classified; staleness is never
//! trusted from disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use super::{BreakerError, CircuitBreakerState};
use crate::staleness::{StalenessGuard, StalenessStatus};

/// Load/persist interface for the breaker state record
#[derive(Debug, Clone)]
pub struct BreakerStore {
    path: PathBuf,
}

impl BreakerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the persisted record, re-classifying its age
    ///
    /// An EXPIRED record is discarded unless it demands a manual reset, in
    /// which case the halt is honored regardless of age.
    pub fn load(
        &self,
        guard: &StalenessGuard,
    ) -> Result<Option<CircuitBreakerState>, BreakerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let state: CircuitBreakerState = serde_json::from_str(&content)?;

        let meta = guard.classify(state.last_evaluated_at, Utc::now());
        if meta.status == StalenessStatus::Expired {
            if state.requires_manual_reset {
                warn!(
                    age_hours = meta.staleness_hours,
                    tier = %state.tier,
                    "Persisted breaker state is expired but demands a manual reset; honoring the halt"
                );
                return Ok(Some(state));
            }
            warn!(
                age_hours = meta.staleness_hours,
                tier = %state.tier,
                "Persisted breaker state is expired; starting fresh"
            );
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Write the record atomically
    pub fn persist(&self, state: &CircuitBreakerState) -> Result<(), BreakerError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::Tier;
    use chrono::Duration;

    fn state(tier: Tier, age_hours: i64, manual_reset: bool) -> CircuitBreakerState {
        let evaluated = Utc::now() - Duration::hours(age_hours);
        CircuitBreakerState {
            tier,
            tripped_at: Some(evaluated),
            reason: Some("test".to_string()),
            requires_manual_reset: manual_reset,
            last_evaluated_at: evaluated,
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BreakerStore::new(dir.path().join("breaker_state.json"));
        let guard = StalenessGuard::default();

        store.persist(&state(Tier::Tier2, 1, false)).unwrap();
        let loaded = store.load(&guard).unwrap().unwrap();
        assert_eq!(loaded.tier, Tier::Tier2);
        assert!(!loaded.requires_manual_reset);
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BreakerStore::new(dir.path().join("missing.json"));
        let guard = StalenessGuard::default();
        assert!(store.load(&guard).unwrap().is_none());
    }

    #[test]
    fn test_expired_record_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = BreakerStore::new(dir.path().join("breaker_state.json"));
        let guard = StalenessGuard::default();

        store.persist(&state(Tier::Tier2, 80, false)).unwrap();
        assert!(store.load(&guard).unwrap().is_none());
    }

    #[test]
    fn test_expired_tier4_halt_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let store = BreakerStore::new(dir.path().join("breaker_state.json"));
        let guard = StalenessGuard::default();

        store.persist(&state(Tier::Tier4, 80, true)).unwrap();
        let loaded = store.load(&guard).unwrap().unwrap();
        assert_eq!(loaded.tier, Tier::Tier4);
        assert!(loaded.requires_manual_reset);
    }

    #[test]
    fn test_persist_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breaker_state.json");
        let store = BreakerStore::new(&path);
        let guard = StalenessGuard::default();

        store.persist(&state(Tier::Tier1, 1, false)).unwrap();
        store.persist(&state(Tier::Tier3, 1, false)).unwrap();

        let loaded = store.load(&guard).unwrap().unwrap();
        assert_eq!(loaded.tier, Tier::Tier3);
        // No stray temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }
}
