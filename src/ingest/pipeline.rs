/// One ingestion cycle: fetch and store a reading for every location.
///
/// Locations are processed strictly one at a time, each fetch waiting on the
/// shared `RateLimiter` first. A failed location is logged and counted, and
/// the cycle moves on. A credential failure aborts the rest of the cycle,
/// since every remaining call would fail the same way. Store failures
/// propagate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ingest::pacing::RateLimiter;
use crate::ingest::WeatherSource;
use crate::model::{Location, ServiceError};
use crate::store::{CatalogStore, ReadingStore};

/// Counts for one cycle. `cancelled` is set when the cycle stopped early
/// at a location boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation flag, checked between locations only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct IngestionPipeline {
    source: Arc<dyn WeatherSource>,
    limiter: Arc<RateLimiter>,
    cancel: CancelToken,
}

impl IngestionPipeline {
    pub fn new(source: Arc<dyn WeatherSource>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            source,
            limiter,
            cancel: CancelToken::new(),
        }
    }

    /// Shares a cancellation token with the pipeline.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetches and stores one reading per location, in order.
    pub fn run_cycle<R>(&self, store: &R, locations: &[Location]) -> Result<CycleSummary, ServiceError>
    where
        R: ReadingStore + ?Sized,
    {
        log::info!("Fetching weather for {} locations...", locations.len());

        let mut summary = CycleSummary::default();

        for location in locations {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "Ingestion cancelled after {} of {} locations",
                    summary.succeeded + summary.failed,
                    locations.len()
                );
                summary.cancelled = true;
                break;
            }

            self.limiter.acquire();

            match self.source.fetch(location.latitude, location.longitude) {
                Ok(obs) => {
                    let id = store.insert_reading(location.id, &obs)?;
                    log::info!(
                        "Weather for {} (ID: {}): {:.1}°C, {:.1}mm rain [reading {}]",
                        location.name,
                        location.id,
                        obs.temperature_c,
                        obs.rainfall_1h_mm,
                        id
                    );
                    summary.succeeded += 1;
                }
                Err(e) if e.is_cycle_fatal() => {
                    log::error!(
                        "Fatal error fetching weather for {} (ID: {}), aborting cycle: {}",
                        location.name,
                        location.id,
                        e
                    );
                    return Err(ServiceError::Configuration(e));
                }
                Err(e) => {
                    log::warn!(
                        "Failed to fetch weather for {} (ID: {}) [{}]: {}",
                        location.name,
                        location.id,
                        e.kind(),
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Weather collection complete: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        Ok(summary)
    }

    /// Lists every known location, then runs a cycle over them.
    pub fn run_cycle_for_all<S>(&self, store: &S) -> Result<CycleSummary, ServiceError>
    where
        S: CatalogStore + ReadingStore + ?Sized,
    {
        let locations = store.list_locations()?;
        self.run_cycle(store, &locations)
    }
}
