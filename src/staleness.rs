//! Snapshot age classification
//!
//! Every cached snapshot is classified before it feeds the sizer, validator, or
//! circuit breaker. Degraded-but-usable ages (AGING, STALE) are reported as
//! values with warnings; only EXPIRED is a hard refusal.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::config::StalenessConfig;

/// Staleness errors
#[derive(Debug, Error)]
pub enum StalenessError {
    /// Snapshot is too old to base any decision on
    #[error(
        "Snapshot data expired: fetched {age_hours:.1}h ago, limit is {limit_hours:.1}h. \
         Refusing to proceed; refetch the snapshot before the next decision cycle."
    )]
    ExpiredData { age_hours: f64, limit_hours: f64 },
}

/// How old a snapshot is relative to the trust bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessStatus {
    Fresh,
    Aging,
    Stale,
    Expired,
}

/// Derived staleness metadata attached to a snapshot on load
///
/// Never persisted as authoritative; recomputed on every load.
#[derive(Debug, Clone, Copy)]
pub struct DataSnapshotMeta {
    pub fetched_at: DateTime<Utc>,
    pub staleness_hours: f64,
    pub status: StalenessStatus,
    pub confidence: f64,
}

/// Classifies snapshot age into trust bands (lower bound inclusive)
#[derive(Debug, Clone)]
pub struct StalenessGuard {
    config: StalenessConfig,
}

impl StalenessGuard {
    pub fn new(config: StalenessConfig) -> Self {
        Self { config }
    }

    /// Classify a snapshot's age relative to `now`
    pub fn classify(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> DataSnapshotMeta {
        let age_hours = (now - fetched_at).num_seconds().max(0) as f64 / 3600.0;

        let (status, confidence) = if age_hours < self.config.fresh_max_hours {
            (StalenessStatus::Fresh, 0.95)
        } else if age_hours < self.config.aging_max_hours {
            (StalenessStatus::Aging, 0.70)
        } else if age_hours < self.config.stale_max_hours {
            (StalenessStatus::Stale, 0.30)
        } else {
            (StalenessStatus::Expired, 0.05)
        };

        DataSnapshotMeta {
            fetched_at,
            staleness_hours: age_hours,
            status,
            confidence,
        }
    }

    /// Gate a classified snapshot: warn on degraded bands, refuse EXPIRED
    pub fn guard(&self, meta: &DataSnapshotMeta) -> Result<(), StalenessError> {
        match meta.status {
            StalenessStatus::Fresh => Ok(()),
            StalenessStatus::Aging => {
                warn!(
                    age_hours = meta.staleness_hours,
                    confidence = meta.confidence,
                    "Snapshot is aging; proceeding with reduced confidence"
                );
                Ok(())
            }
            StalenessStatus::Stale => {
                warn!(
                    age_hours = meta.staleness_hours,
                    confidence = meta.confidence,
                    "Snapshot is STALE; decisions based on it are low-confidence"
                );
                Ok(())
            }
            StalenessStatus::Expired => Err(StalenessError::ExpiredData {
                age_hours: meta.staleness_hours,
                limit_hours: self.config.stale_max_hours,
            }),
        }
    }
}

impl Default for StalenessGuard {
    fn default() -> Self {
        Self::new(StalenessConfig::default())
    }
}
