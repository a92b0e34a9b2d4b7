/// Trailing rainfall aggregation.
///
/// For each location the 24h and 72h sums of `rainfall_1h` are recomputed
/// from scratch against the store's readings and written onto the single most
/// recent reading. Windows are anchored at the wall-clock time the
/// aggregation runs (`now - N hours`, inclusive), not at the reading's
/// timestamp. Re-running without new readings writes the same values.
///
/// Picking the latest reading, summing, and writing happen in one store call,
/// so a reading ingested concurrently never leaves the sums on a stale row.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Location, ServiceError};
use crate::store::ReadingStore;

pub use crate::model::{RainfallTotals, WINDOW_24H, WINDOW_72H};

/// What to do when the store fails for one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Log the failure, count it, and carry on with the next location.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    /// Locations whose latest reading received fresh sums.
    pub updated: usize,
    /// Locations with no readings at all (nothing to write onto).
    pub empty: usize,
    /// Locations skipped after a store failure (`Continue` policy only).
    pub failed: usize,
}

pub struct RainfallAggregator {
    policy: AggregationPolicy,
}

impl RainfallAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// Recomputes and writes the sums for one location. Returns `None` when
    /// the location has no readings.
    pub fn update_location<R>(&self, store: &R, location_id: i32, now: DateTime<Utc>) -> Result<Option<RainfallTotals>, ServiceError>
    where
        R: ReadingStore + ?Sized,
    {
        Ok(store.update_latest_aggregates(location_id, now)?)
    }

    /// Updates aggregates for every location, each independently.
    pub fn update_aggregates<R>(&self, store: &R, locations: &[Location], now: DateTime<Utc>) -> Result<AggregationSummary, ServiceError>
    where
        R: ReadingStore + ?Sized,
    {
        log::info!("Updating rainfall aggregates for {} locations...", locations.len());

        let mut summary = AggregationSummary::default();

        for location in locations {
            match self.update_location(store, location.id, now) {
                Ok(Some(totals)) => {
                    log::debug!(
                        "Location {}: 24h {:.1}mm, 72h {:.1}mm (reading {})",
                        location.id,
                        totals.rainfall_24h_mm,
                        totals.rainfall_72h_mm,
                        totals.reading_id
                    );
                    summary.updated += 1;
                }
                Ok(None) => {
                    log::debug!("Location {}: no readings, nothing to aggregate", location.id);
                    summary.empty += 1;
                }
                Err(e) => match self.policy {
                    AggregationPolicy::Abort => {
                        log::error!("Error updating aggregates for location {}: {}", location.id, e);
                        return Err(e);
                    }
                    AggregationPolicy::Continue => {
                        log::warn!("Skipping aggregates for location {}: {}", location.id, e);
                        summary.failed += 1;
                    }
                },
            }
        }

        log::info!(
            "Rainfall aggregates updated: {} updated, {} empty, {} failed",
            summary.updated,
            summary.empty,
            summary.failed
        );
        Ok(summary)
    }
}
