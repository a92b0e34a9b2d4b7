/// Persistence contracts the core depends on.
///
/// The traits are split by owner: the catalog (locations, historical floods)
/// is reference data written upstream, readings belong to ingestion and
/// aggregation, assessments to the scoring engine, and the system log to the
/// scheduler. `Store` bundles them for components that need everything.
///
/// All methods take `&self`; implementations serialize access internally so
/// a single store can be shared between the scheduler worker, the endpoint
/// and manual scoring runs.
///
/// Implementations:
/// - `memory` — in-process store for tests and dry runs
/// - `pg`     — PostgreSQL-backed store used by the daemon

pub mod memory;
pub mod pg;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{
    HistoricalFlood, Location, RainfallTotals, RiskAssessment, WeatherObservation, WeatherReading,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    /// A value could not be represented in a NUMERIC column (NaN, infinite).
    #[error("cannot store {field} value {value} as NUMERIC")]
    Numeric { field: &'static str, value: f64 },
    #[error("weather reading {0} does not exist")]
    MissingReading(i64),
    #[error("stored row is invalid: {0}")]
    InvalidRow(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only access to reference data owned by upstream data-entry flows.
pub trait CatalogStore: Send + Sync {
    fn list_locations(&self) -> StoreResult<Vec<Location>>;
    fn find_location(&self, location_id: i32) -> StoreResult<Option<Location>>;
    /// Floods at `location_id` dated on or after `since`.
    fn list_historical_floods(
        &self,
        location_id: i32,
        since: NaiveDate,
    ) -> StoreResult<Vec<HistoricalFlood>>;
}

/// Weather readings: append-only rows plus the derived aggregate fields
/// on the latest row.
pub trait ReadingStore: Send + Sync {
    /// Appends a reading and returns its id.
    fn insert_reading(&self, location_id: i32, obs: &WeatherObservation) -> StoreResult<i64>;
    /// The reading with the greatest timestamp (ties: greatest id).
    fn latest_reading(&self, location_id: i32) -> StoreResult<Option<WeatherReading>>;
    /// Sum of `rainfall_1h_mm` over readings with
    /// `timestamp >= now - window_hours`. Zero when there are none.
    fn sum_rainfall(&self, location_id: i32, window_hours: i64, now: DateTime<Utc>) -> StoreResult<f64>;
    fn update_aggregate_fields(&self, reading_id: i64, rainfall_24h_mm: f64, rainfall_72h_mm: f64) -> StoreResult<()>;
    /// Picks the latest reading, sums the 24h and 72h windows ending at
    /// `now`, and writes them onto that reading as one atomic step: a
    /// reading inserted concurrently is either included and written to, or
    /// left for the next pass. `None` when the location has no readings.
    fn update_latest_aggregates(&self, location_id: i32, now: DateTime<Utc>) -> StoreResult<Option<RainfallTotals>>;
}

/// Insert-only risk assessments.
pub trait AssessmentStore: Send + Sync {
    /// Persists an assessment (factors in order) and returns its id.
    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> StoreResult<i64>;
    fn latest_risk_assessment(&self, location_id: i32) -> StoreResult<Option<RiskAssessment>>;
}

/// Persistent log of cycle-level failures.
pub trait SystemLogStore: Send + Sync {
    fn append_system_log(
        &self,
        log_type: &str,
        message: &str,
        metadata: &serde_json::Value,
    ) -> StoreResult<()>;
}

/// Everything the service needs from persistence.
pub trait Store: CatalogStore + ReadingStore + AssessmentStore + SystemLogStore {}

impl<T> Store for T where T: CatalogStore + ReadingStore + AssessmentStore + SystemLogStore {}
