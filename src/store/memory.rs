/// In-process store backed by plain vectors behind one mutex.
///
/// Used by the test suites and for dry runs without a database. Every trait
/// call takes the lock once, so each operation is atomic with respect to the
/// others, including the single-row aggregate update.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard};

use crate::model::{
    HistoricalFlood, Location, RainfallTotals, RiskAssessment, SystemLogEntry, WeatherObservation,
    WeatherReading, WINDOW_24H, WINDOW_72H,
};
use crate::store::{
    AssessmentStore, CatalogStore, ReadingStore, StoreError, StoreResult, SystemLogStore,
};

#[derive(Default)]
struct Inner {
    locations: Vec<Location>,
    floods: Vec<HistoricalFlood>,
    readings: Vec<WeatherReading>,
    assessments: Vec<RiskAssessment>,
    system_logs: Vec<SystemLogEntry>,
    next_reading_id: i64,
    next_flood_id: i64,
    next_assessment_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given catalog.
    pub fn with_locations(locations: Vec<Location>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.locations = locations;
        }
        store
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {}", e)))
    }

    pub fn add_location(&self, location: Location) -> StoreResult<()> {
        self.lock()?.locations.push(location);
        Ok(())
    }

    /// Records a historical flood and returns its id.
    pub fn add_historical_flood(&self, location_id: i32, flood_date: NaiveDate) -> StoreResult<i64> {
        let mut inner = self.lock()?;
        inner.next_flood_id += 1;
        let id = inner.next_flood_id;
        inner.floods.push(HistoricalFlood {
            id,
            location_id,
            flood_date,
            severity: None,
            notes: None,
        });
        Ok(id)
    }

    /// All readings for a location in insertion order.
    pub fn readings_for(&self, location_id: i32) -> StoreResult<Vec<WeatherReading>> {
        Ok(self
            .lock()?
            .readings
            .iter()
            .filter(|r| r.location_id == location_id)
            .cloned()
            .collect())
    }

    pub fn reading_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.readings.len())
    }

    /// All assessments for a location in insertion order.
    pub fn assessments_for(&self, location_id: i32) -> StoreResult<Vec<RiskAssessment>> {
        Ok(self
            .lock()?
            .assessments
            .iter()
            .filter(|a| a.location_id == location_id)
            .cloned()
            .collect())
    }

    pub fn system_logs(&self) -> StoreResult<Vec<SystemLogEntry>> {
        Ok(self.lock()?.system_logs.clone())
    }
}

impl CatalogStore for MemoryStore {
    fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let mut locations = self.lock()?.locations.clone();
        locations.sort_by_key(|l| l.id);
        Ok(locations)
    }

    fn find_location(&self, location_id: i32) -> StoreResult<Option<Location>> {
        Ok(self.lock()?.locations.iter().find(|l| l.id == location_id).cloned())
    }

    fn list_historical_floods(&self, location_id: i32, since: NaiveDate) -> StoreResult<Vec<HistoricalFlood>> {
        Ok(self
            .lock()?
            .floods
            .iter()
            .filter(|f| f.location_id == location_id && f.flood_date >= since)
            .cloned()
            .collect())
    }
}

impl ReadingStore for MemoryStore {
    fn insert_reading(&self, location_id: i32, obs: &WeatherObservation) -> StoreResult<i64> {
        let mut inner = self.lock()?;
        inner.next_reading_id += 1;
        let id = inner.next_reading_id;
        inner.readings.push(WeatherReading::from_observation(id, location_id, obs));
        Ok(id)
    }

    fn latest_reading(&self, location_id: i32) -> StoreResult<Option<WeatherReading>> {
        Ok(self
            .lock()?
            .readings
            .iter()
            .filter(|r| r.location_id == location_id)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    fn sum_rainfall(&self, location_id: i32, window_hours: i64, now: DateTime<Utc>) -> StoreResult<f64> {
        let since = now - Duration::hours(window_hours);
        Ok(self
            .lock()?
            .readings
            .iter()
            .filter(|r| r.location_id == location_id && r.timestamp >= since)
            .map(|r| r.rainfall_1h_mm)
            .sum())
    }

    fn update_aggregate_fields(&self, reading_id: i64, rainfall_24h_mm: f64, rainfall_72h_mm: f64) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let reading = inner
            .readings
            .iter_mut()
            .find(|r| r.id == reading_id)
            .ok_or(StoreError::MissingReading(reading_id))?;
        reading.rainfall_24h_mm = Some(rainfall_24h_mm);
        reading.rainfall_72h_mm = Some(rainfall_72h_mm);
        Ok(())
    }

    fn update_latest_aggregates(&self, location_id: i32, now: DateTime<Utc>) -> StoreResult<Option<RainfallTotals>> {
        let mut inner = self.lock()?;
        let since_24h = now - Duration::hours(WINDOW_24H);
        let since_72h = now - Duration::hours(WINDOW_72H);

        let mut rainfall_24h_mm = 0.0;
        let mut rainfall_72h_mm = 0.0;
        let mut latest: Option<&mut WeatherReading> = None;
        for reading in inner.readings.iter_mut().filter(|r| r.location_id == location_id) {
            if reading.timestamp >= since_24h {
                rainfall_24h_mm += reading.rainfall_1h_mm;
            }
            if reading.timestamp >= since_72h {
                rainfall_72h_mm += reading.rainfall_1h_mm;
            }
            let newer = latest
                .as_ref()
                .map_or(true, |l| (reading.timestamp, reading.id) > (l.timestamp, l.id));
            if newer {
                latest = Some(reading);
            }
        }

        Ok(latest.map(|reading| {
            reading.rainfall_24h_mm = Some(rainfall_24h_mm);
            reading.rainfall_72h_mm = Some(rainfall_72h_mm);
            RainfallTotals {
                reading_id: reading.id,
                rainfall_24h_mm,
                rainfall_72h_mm,
            }
        }))
    }
}

impl AssessmentStore for MemoryStore {
    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> StoreResult<i64> {
        let mut inner = self.lock()?;
        inner.next_assessment_id += 1;
        let id = inner.next_assessment_id;
        let mut stored = assessment.clone();
        stored.id = Some(id);
        inner.assessments.push(stored);
        Ok(id)
    }

    fn latest_risk_assessment(&self, location_id: i32) -> StoreResult<Option<RiskAssessment>> {
        Ok(self
            .lock()?
            .assessments
            .iter()
            .filter(|a| a.location_id == location_id)
            .max_by_key(|a| (a.assessed_at, a.id))
            .cloned())
    }
}

impl SystemLogStore for MemoryStore {
    fn append_system_log(&self, log_type: &str, message: &str, metadata: &serde_json::Value) -> StoreResult<()> {
        self.lock()?.system_logs.push(SystemLogEntry {
            log_type: log_type.to_string(),
            message: message.to_string(),
            metadata: metadata.clone(),
            logged_at: Utc::now(),
        });
        Ok(())
    }
}
