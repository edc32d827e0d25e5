use chrono::{DateTime, Duration, Utc};

use crate::config::DEFAULT_STALENESS_HOURS;
use crate::db::{CustomerReader, StoreError};

/// Upper bound keeps `Duration::hours` in range.
const MAX_THRESHOLD_HOURS: u64 = 24 * 365 * 100;

/// Why a sync should (or should not) hit the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerdict {
    Forced,
    NoLocalData,
    NeverSynced,
    Stale,
    Fresh,
}

impl SyncVerdict {
    pub fn needs_sync(self) -> bool {
        self != SyncVerdict::Fresh
    }
}

/// Decides whether a sync should hit the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_hours(DEFAULT_STALENESS_HOURS)
    }
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours.min(MAX_THRESHOLD_HOURS) as i64))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// True iff more than the threshold has elapsed since `last_sync`.
    pub fn is_stale(&self, last_sync: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_sync > self.threshold
    }

    /// Verdict for an unforced request. Pure, no logging.
    pub fn verdict(
        &self,
        local_records: u64,
        last_sync: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SyncVerdict {
        if local_records == 0 {
            return SyncVerdict::NoLocalData;
        }
        match last_sync {
            None => SyncVerdict::NeverSynced,
            Some(last_sync) if self.is_stale(last_sync, now) => SyncVerdict::Stale,
            Some(_) => SyncVerdict::Fresh,
        }
    }

    pub async fn should_sync(
        &self,
        store: &CustomerReader,
        force_refresh: bool,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        self.should_sync_at(store, force_refresh, last_sync, Utc::now())
            .await
    }

    /// [`should_sync`](Self::should_sync) evaluated at a fixed `now`.
    pub async fn should_sync_at(
        &self,
        store: &CustomerReader,
        force_refresh: bool,
        last_sync: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Forced requests skip the count.
        let verdict = if force_refresh {
            SyncVerdict::Forced
        } else {
            self.verdict(store.count().await?, last_sync, now)
        };

        match verdict {
            SyncVerdict::Forced => tracing::info!("Sync forced by user action."),
            SyncVerdict::NoLocalData => tracing::info!("Sync required: No local data."),
            SyncVerdict::NeverSynced => {
                tracing::info!("Sync required: No last sync timestamp found.")
            }
            SyncVerdict::Stale => tracing::info!("Sync required: Data is stale."),
            SyncVerdict::Fresh => tracing::info!("Sync not required: Data is fresh."),
        }
        Ok(verdict.needs_sync())
    }
}
