/// PostgreSQL-backed store.
///
/// Schema: sql/001_initial_schema.sql. A single synchronous connection sits
/// behind a mutex, so every store call runs to completion before the next
/// one starts. The latest-reading aggregate is picked, summed and written
/// by one `UPDATE ... RETURNING` statement, so a reading inserted by another
/// connection mid-way cannot end up newer than the row that got the sums.
/// An assessment plus its factors are written in one transaction.
///
/// Rainfall and elevation are `NUMERIC` columns and cross the boundary as
/// `rust_decimal::Decimal`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use postgres::{Client, Row};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::{Mutex, MutexGuard};

use crate::db::{self, DbConfigError, REQUIRED_TABLES};
use crate::model::{
    FactorKind, HistoricalFlood, Location, RainfallTotals, RiskAssessment, RiskFactor, RiskLevel,
    WeatherObservation, WeatherReading, WINDOW_24H, WINDOW_72H,
};
use crate::store::{
    AssessmentStore, CatalogStore, ReadingStore, StoreError, StoreResult, SystemLogStore,
};

pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self { client: Mutex::new(client) }
    }

    /// Connects using DATABASE_URL and verifies every required table.
    pub fn connect() -> Result<Self, DbConfigError> {
        let client = db::connect_and_verify(REQUIRED_TABLES)?;
        Ok(Self::new(client))
    }

    fn client(&self) -> StoreResult<MutexGuard<'_, Client>> {
        self.client
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// NUMERIC conversion
// ---------------------------------------------------------------------------

fn to_numeric(field: &'static str, value: f64) -> StoreResult<Decimal> {
    Decimal::from_f64_retain(value).ok_or(StoreError::Numeric { field, value })
}

fn from_numeric(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const READING_COLUMNS: &str = "id, location_id, reading_time, temperature, humidity, rainfall_1h, \
                               wind_speed, pressure, weather_condition, rainfall_24h, rainfall_72h";

fn reading_from_row(row: &Row) -> WeatherReading {
    WeatherReading {
        id: row.get(0),
        location_id: row.get(1),
        timestamp: row.get(2),
        temperature_c: row.get(3),
        humidity_pct: row.get(4),
        rainfall_1h_mm: from_numeric(row.get(5)),
        wind_speed_ms: row.get(6),
        pressure_hpa: row.get(7),
        condition: row.get(8),
        rainfall_24h_mm: row.get::<_, Option<Decimal>>(9).map(from_numeric),
        rainfall_72h_mm: row.get::<_, Option<Decimal>>(10).map(from_numeric),
    }
}

fn location_from_row(row: &Row) -> Location {
    Location {
        id: row.get(0),
        name: row.get(1),
        latitude: row.get(2),
        longitude: row.get(3),
        elevation_m: row.get::<_, Option<Decimal>>(4).map(from_numeric),
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl CatalogStore for PgStore {
    fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let rows = self.client()?.query(
            "SELECT id, name, latitude, longitude, elevation FROM locations ORDER BY id",
            &[],
        )?;
        Ok(rows.iter().map(location_from_row).collect())
    }

    fn find_location(&self, location_id: i32) -> StoreResult<Option<Location>> {
        let rows = self.client()?.query(
            "SELECT id, name, latitude, longitude, elevation FROM locations WHERE id = $1",
            &[&location_id],
        )?;
        Ok(rows.first().map(location_from_row))
    }

    fn list_historical_floods(&self, location_id: i32, since: NaiveDate) -> StoreResult<Vec<HistoricalFlood>> {
        let rows = self.client()?.query(
            "SELECT id, location_id, flood_date, severity, notes
             FROM historical_floods
             WHERE location_id = $1 AND flood_date >= $2
             ORDER BY flood_date",
            &[&location_id, &since],
        )?;

        Ok(rows
            .iter()
            .map(|row| HistoricalFlood {
                id: row.get(0),
                location_id: row.get(1),
                flood_date: row.get(2),
                severity: row.get(3),
                notes: row.get(4),
            })
            .collect())
    }
}

impl ReadingStore for PgStore {
    fn insert_reading(&self, location_id: i32, obs: &WeatherObservation) -> StoreResult<i64> {
        let rainfall = to_numeric("rainfall_1h", obs.rainfall_1h_mm)?;
        let row = self.client()?.query_one(
            "INSERT INTO weather_data
             (location_id, reading_time, temperature, humidity, rainfall_1h, wind_speed, pressure, weather_condition)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
            &[
                &location_id,
                &obs.observed_at,
                &obs.temperature_c,
                &obs.humidity_pct,
                &rainfall,
                &obs.wind_speed_ms,
                &obs.pressure_hpa,
                &obs.condition,
            ],
        )?;

        let id: i64 = row.get(0);
        log::debug!("Weather reading saved for location {}, id {}", location_id, id);
        Ok(id)
    }

    fn latest_reading(&self, location_id: i32) -> StoreResult<Option<WeatherReading>> {
        let query = format!(
            "SELECT {} FROM weather_data
             WHERE location_id = $1
             ORDER BY reading_time DESC, id DESC
             LIMIT 1",
            READING_COLUMNS
        );
        let rows = self.client()?.query(query.as_str(), &[&location_id])?;
        Ok(rows.first().map(reading_from_row))
    }

    fn sum_rainfall(&self, location_id: i32, window_hours: i64, now: DateTime<Utc>) -> StoreResult<f64> {
        let since = now - Duration::hours(window_hours);
        let row = self.client()?.query_one(
            "SELECT COALESCE(SUM(rainfall_1h), 0)
             FROM weather_data
             WHERE location_id = $1 AND reading_time >= $2",
            &[&location_id, &since],
        )?;
        Ok(from_numeric(row.get(0)))
    }

    fn update_aggregate_fields(&self, reading_id: i64, rainfall_24h_mm: f64, rainfall_72h_mm: f64) -> StoreResult<()> {
        let r24 = to_numeric("rainfall_24h", rainfall_24h_mm)?;
        let r72 = to_numeric("rainfall_72h", rainfall_72h_mm)?;

        let updated = self.client()?.execute(
            "UPDATE weather_data SET rainfall_24h = $1, rainfall_72h = $2 WHERE id = $3",
            &[&r24, &r72, &reading_id],
        )?;

        if updated == 0 {
            return Err(StoreError::MissingReading(reading_id));
        }
        Ok(())
    }

    fn update_latest_aggregates(&self, location_id: i32, now: DateTime<Utc>) -> StoreResult<Option<RainfallTotals>> {
        let since_24h = now - Duration::hours(WINDOW_24H);
        let since_72h = now - Duration::hours(WINDOW_72H);

        let row = self.client()?.query_opt(
            "WITH latest AS (
                 SELECT id FROM weather_data
                 WHERE location_id = $1
                 ORDER BY reading_time DESC, id DESC
                 LIMIT 1
             ),
             sums AS (
                 SELECT COALESCE(SUM(rainfall_1h) FILTER (WHERE reading_time >= $2), 0) AS r24,
                        COALESCE(SUM(rainfall_1h) FILTER (WHERE reading_time >= $3), 0) AS r72
                 FROM weather_data
                 WHERE location_id = $1
             )
             UPDATE weather_data w
             SET rainfall_24h = sums.r24, rainfall_72h = sums.r72
             FROM latest, sums
             WHERE w.id = latest.id
             RETURNING w.id, w.rainfall_24h, w.rainfall_72h",
            &[&location_id, &since_24h, &since_72h],
        )?;

        Ok(row.map(|row| RainfallTotals {
            reading_id: row.get(0),
            rainfall_24h_mm: from_numeric(row.get(1)),
            rainfall_72h_mm: from_numeric(row.get(2)),
        }))
    }
}

impl AssessmentStore for PgStore {
    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> StoreResult<i64> {
        let r24 = assessment.rainfall_24h_mm.map(|v| to_numeric("rainfall_24h", v)).transpose()?;
        let r72 = assessment.rainfall_72h_mm.map(|v| to_numeric("rainfall_72h", v)).transpose()?;
        let score = i32::try_from(assessment.risk_score)
            .map_err(|_| StoreError::InvalidRow(format!("risk score {} overflows INTEGER", assessment.risk_score)))?;

        let mut client = self.client()?;
        let mut tx = client.transaction()?;

        let row = tx.query_one(
            "INSERT INTO risk_assessments
             (location_id, assessed_at, risk_level, risk_score, risk_color, recommended_action,
              rainfall_24h, rainfall_72h, rules_version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
            &[
                &assessment.location_id,
                &assessment.assessed_at,
                &assessment.risk_level.as_str(),
                &score,
                &assessment.risk_color,
                &assessment.recommended_action,
                &r24,
                &r72,
                &assessment.rules_version,
            ],
        )?;
        let id: i64 = row.get(0);

        for (position, factor) in assessment.factors.iter().enumerate() {
            let position = position as i16;
            let factor_score = factor.score as i32;
            tx.execute(
                "INSERT INTO risk_factors (assessment_id, position, factor, score, label, value)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[&id, &position, &factor.factor.as_str(), &factor_score, &factor.label, &factor.value],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    fn latest_risk_assessment(&self, location_id: i32) -> StoreResult<Option<RiskAssessment>> {
        let mut client = self.client()?;

        let rows = client.query(
            "SELECT id, location_id, assessed_at, risk_level, risk_score, risk_color,
                    recommended_action, rainfall_24h, rainfall_72h, rules_version
             FROM risk_assessments
             WHERE location_id = $1
             ORDER BY assessed_at DESC, id DESC
             LIMIT 1",
            &[&location_id],
        )?;

        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(None),
        };

        let id: i64 = row.get(0);
        let level_str: String = row.get(3);
        let risk_level = RiskLevel::parse(&level_str)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown risk level '{}'", level_str)))?;
        let risk_score: i32 = row.get(4);

        let factor_rows = client.query(
            "SELECT factor, score, label, value
             FROM risk_factors
             WHERE assessment_id = $1
             ORDER BY position",
            &[&id],
        )?;

        let mut factors = Vec::with_capacity(factor_rows.len());
        for factor_row in &factor_rows {
            let name: String = factor_row.get(0);
            let factor = FactorKind::parse(&name)
                .ok_or_else(|| StoreError::InvalidRow(format!("unknown risk factor '{}'", name)))?;
            let score: i32 = factor_row.get(1);
            factors.push(RiskFactor {
                factor,
                score: score.max(0) as u32,
                label: factor_row.get(2),
                value: factor_row.get(3),
            });
        }

        Ok(Some(RiskAssessment {
            id: Some(id),
            location_id: row.get(1),
            assessed_at: row.get(2),
            risk_score: risk_score.max(0) as u32,
            risk_level,
            risk_color: row.get(5),
            recommended_action: row.get(6),
            factors,
            rainfall_24h_mm: row.get::<_, Option<Decimal>>(7).map(from_numeric),
            rainfall_72h_mm: row.get::<_, Option<Decimal>>(8).map(from_numeric),
            rules_version: row.get(9),
        }))
    }
}

impl SystemLogStore for PgStore {
    fn append_system_log(&self, log_type: &str, message: &str, metadata: &serde_json::Value) -> StoreResult<()> {
        self.client()?.execute(
            "INSERT INTO system_logs (log_type, message, metadata) VALUES ($1, $2, $3)",
            &[&log_type, &message, metadata],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_round_trip() {
        let d = to_numeric("rainfall_1h", 12.5).unwrap();
        assert_eq!(from_numeric(d), 12.5);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert!(matches!(
            to_numeric("rainfall_24h", f64::NAN),
            Err(StoreError::Numeric { field: "rainfall_24h", .. })
        ));
        assert!(to_numeric("rainfall_24h", f64::INFINITY).is_err());
    }
}
