/// Rule-based flood risk scoring.
///
/// An assessment combines five independent factor scores, each taken from
/// the first matching rule of its category in the active `RuleTable`:
///
///   rainfall_24h  - trailing 24h sum on the latest reading
///   rainfall_72h  - trailing 72h sum on the latest reading
///   elevation     - location elevation in meters (unknown scores 0)
///   season        - UTC month of the assessment time
///   historical    - floods within the trailing window of years
///
/// Factors that score 0 are left out; the rest keep that order. The total
/// maps onto a risk tier. `assess` is pure; `assess_location` and
/// `assess_all` load inputs from the store and persist the result.
///
/// A latest reading the aggregator has not reached yet (ingested this cycle,
/// aggregates still `NULL`) is scored against windows summed from the store
/// at assessment time. Nothing is written back onto the reading.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use std::sync::Arc;

use crate::model::{
    FactorKind, HistoricalFlood, Location, RiskAssessment, RiskFactor, ServiceError, WeatherReading,
    WINDOW_24H, WINDOW_72H,
};
use crate::rules::{first_match, RuleTable, ScoringRule};
use crate::store::{AssessmentStore, CatalogStore, ReadingStore};

/// Counts for a bulk scoring pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringSummary {
    pub assessed: usize,
    /// Locations skipped because they have no readings yet.
    pub no_data: usize,
    pub failed: usize,
}

pub struct RiskScoringEngine {
    rules: Arc<RuleTable>,
}

impl RiskScoringEngine {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// First day counted as "recent" for historical floods.
    pub fn flood_window_start(&self, now: DateTime<Utc>) -> NaiveDate {
        let years = self.rules.historical_window_years;
        now.date_naive()
            .checked_sub_months(Months::new(years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN)
    }

    // -----------------------------------------------------------------------
    // Pure scoring
    // -----------------------------------------------------------------------

    /// Scores one location from its latest reading and flood history.
    ///
    /// Floods dated before the trailing window are ignored even if the
    /// caller passes them in. The returned assessment has no id.
    pub fn assess(
        &self,
        location: &Location,
        reading: &WeatherReading,
        floods: &[HistoricalFlood],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let rules = &self.rules;
        let mut factors = Vec::new();

        if let Some(r24) = reading.rainfall_24h_mm {
            push_factor(&mut factors, FactorKind::Rainfall24h, first_match(&rules.rainfall_24h, &r24), r24);
        }
        if let Some(r72) = reading.rainfall_72h_mm {
            push_factor(&mut factors, FactorKind::Rainfall72h, first_match(&rules.rainfall_72h, &r72), r72);
        }
        if let Some(elevation) = location.elevation_m {
            push_factor(&mut factors, FactorKind::Elevation, first_match(&rules.elevation, &elevation), elevation);
        }

        let month = now.month();
        push_factor(&mut factors, FactorKind::Season, first_match(&rules.season, &month), month as f64);

        let since = self.flood_window_start(now);
        let recent = floods
            .iter()
            .filter(|f| f.location_id == location.id && f.flood_date >= since)
            .count() as u32;
        push_factor(
            &mut factors,
            FactorKind::HistoricalFloods,
            first_match(&rules.historical_floods, &recent),
            recent as f64,
        );

        let risk_score = factors.iter().map(|f| f.score).sum();
        let tier = rules.resolve_tier(risk_score);

        RiskAssessment {
            id: None,
            location_id: location.id,
            assessed_at: now,
            risk_score,
            risk_level: tier.level,
            risk_color: tier.color,
            recommended_action: tier.action,
            factors,
            rainfall_24h_mm: reading.rainfall_24h_mm,
            rainfall_72h_mm: reading.rainfall_72h_mm,
            rules_version: rules.version.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Store-backed operations
    // -----------------------------------------------------------------------

    /// Scores and persists one location. `Ok(None)` when it has no readings.
    ///
    /// # Errors
    /// `ServiceError::LocationNotFound` for an unknown id, and
    /// `ServiceError::Persistence` when the store fails.
    pub fn assess_location<S>(&self, store: &S, location_id: i32, now: DateTime<Utc>) -> Result<Option<RiskAssessment>, ServiceError>
    where
        S: CatalogStore + ReadingStore + AssessmentStore + ?Sized,
    {
        let location = store
            .find_location(location_id)?
            .ok_or(ServiceError::LocationNotFound(location_id))?;

        let mut reading = match store.latest_reading(location_id)? {
            Some(reading) => reading,
            None => {
                log::debug!("No weather data for {} (ID: {}), skipping assessment", location.name, location_id);
                return Ok(None);
            }
        };

        if reading.rainfall_24h_mm.is_none() || reading.rainfall_72h_mm.is_none() {
            log::warn!(
                "Latest reading {} for {} (ID: {}) is not aggregated yet, summing rainfall windows on the fly",
                reading.id,
                location.name,
                location_id
            );
            if reading.rainfall_24h_mm.is_none() {
                reading.rainfall_24h_mm = Some(store.sum_rainfall(location_id, WINDOW_24H, now)?);
            }
            if reading.rainfall_72h_mm.is_none() {
                reading.rainfall_72h_mm = Some(store.sum_rainfall(location_id, WINDOW_72H, now)?);
            }
        }

        let floods = store.list_historical_floods(location_id, self.flood_window_start(now))?;
        let mut assessment = self.assess(&location, &reading, &floods, now);

        let id = store.insert_risk_assessment(&assessment)?;
        assessment.id = Some(id);

        log::info!(
            "Risk for {} (ID: {}): {} (score {}, {} factors)",
            location.name,
            location_id,
            assessment.risk_level,
            assessment.risk_score,
            assessment.factors.len()
        );
        Ok(Some(assessment))
    }

    /// Scores every known location. Per-location failures are logged and
    /// counted; only a failure to list locations aborts the pass.
    pub fn assess_all<S>(&self, store: &S, now: DateTime<Utc>) -> Result<ScoringSummary, ServiceError>
    where
        S: CatalogStore + ReadingStore + AssessmentStore + ?Sized,
    {
        let locations = store.list_locations()?;
        log::info!("Assessing flood risk for {} locations...", locations.len());

        let mut summary = ScoringSummary::default();
        for location in &locations {
            match self.assess_location(store, location.id, now) {
                Ok(Some(_)) => summary.assessed += 1,
                Ok(None) => summary.no_data += 1,
                Err(e) => {
                    log::warn!("Failed to assess {} (ID: {}): {}", location.name, location.id, e);
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Risk assessment complete: {} assessed, {} without data, {} failed",
            summary.assessed,
            summary.no_data,
            summary.failed
        );
        Ok(summary)
    }
}

/// The most recent persisted assessment for a location.
pub fn latest_assessment<S>(store: &S, location_id: i32) -> Result<Option<RiskAssessment>, ServiceError>
where
    S: AssessmentStore + ?Sized,
{
    Ok(store.latest_risk_assessment(location_id)?)
}

fn push_factor<R: ScoringRule>(factors: &mut Vec<RiskFactor>, factor: FactorKind, rule: Option<&R>, value: f64) {
    if let Some(rule) = rule {
        if rule.score() > 0 {
            factors.push(RiskFactor {
                factor,
                score: rule.score(),
                label: rule.label().to_string(),
                value,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RiskLevel, WeatherObservation};
    use crate::rules::ThresholdRule;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn january() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn july() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn location(elevation_m: Option<f64>) -> Location {
        Location {
            id: 1,
            name: "Riverside".to_string(),
            latitude: 40.69,
            longitude: -89.59,
            elevation_m,
        }
    }

    fn reading(r24: Option<f64>, r72: Option<f64>) -> WeatherReading {
        WeatherReading {
            id: 10,
            location_id: 1,
            timestamp: january(),
            temperature_c: 5.0,
            humidity_pct: 80.0,
            rainfall_1h_mm: 0.0,
            wind_speed_ms: 3.0,
            pressure_hpa: 1012.0,
            condition: "light rain".to_string(),
            rainfall_24h_mm: r24,
            rainfall_72h_mm: r72,
        }
    }

    fn flood(date: NaiveDate) -> HistoricalFlood {
        HistoricalFlood {
            id: 1,
            location_id: 1,
            flood_date: date,
            severity: None,
            notes: None,
        }
    }

    fn engine() -> RiskScoringEngine {
        RiskScoringEngine::new(Arc::new(RuleTable::default()))
    }

    #[test]
    fn test_quiet_conditions_score_zero_with_no_factors() {
        let a = engine().assess(&location(Some(250.0)), &reading(Some(2.0), Some(4.0)), &[], january());
        assert_eq!(a.risk_score, 0);
        assert!(a.factors.is_empty());
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.risk_color, "green");
        assert_eq!(a.rules_version, "2024.1");
        assert_eq!(a.id, None);
    }

    #[test]
    fn test_missing_aggregates_and_elevation_score_zero() {
        let a = engine().assess(&location(None), &reading(None, None), &[], january());
        assert_eq!(a.risk_score, 0);
        assert!(a.factors.is_empty());
    }

    #[test]
    fn test_all_factors_in_scoring_order() {
        let floods: Vec<HistoricalFlood> = (0..3)
            .map(|i| flood(NaiveDate::from_ymd_opt(2021 + i, 5, 1).unwrap()))
            .collect();
        let a = engine().assess(&location(Some(8.0)), &reading(Some(60.0), Some(120.0)), &floods, july());

        let kinds: Vec<FactorKind> = a.factors.iter().map(|f| f.factor).collect();
        assert_eq!(
            kinds,
            vec![
                FactorKind::Rainfall24h,
                FactorKind::Rainfall72h,
                FactorKind::Elevation,
                FactorKind::Season,
                FactorKind::HistoricalFloods,
            ]
        );
        // 30 + 20 + 30 + 15 + 15
        assert_eq!(a.risk_score, 110);
        assert_eq!(a.risk_level, RiskLevel::Critical);
        assert_eq!(a.factors[3].value, 7.0);
        assert_eq!(a.factors[4].value, 3.0);
    }

    #[test]
    fn test_first_matching_rule_wins_in_stored_order() {
        let mut rules = RuleTable::default();
        rules.rainfall_24h = vec![
            ThresholdRule { min: 10.0, score: 5, label: "Some rain".into() },
            ThresholdRule { min: 50.0, score: 40, label: "Heavy rain".into() },
        ];
        let engine = RiskScoringEngine::new(Arc::new(rules));

        let a = engine.assess(&location(None), &reading(Some(80.0), None), &[], january());
        assert_eq!(a.factors.len(), 1);
        assert_eq!(a.factors[0].score, 5);
        assert_eq!(a.factors[0].label, "Some rain");
    }

    #[test]
    fn test_floods_outside_window_are_ignored() {
        let now = july();
        let floods = vec![
            flood(NaiveDate::from_ymd_opt(2019, 7, 14).unwrap()),
            flood(NaiveDate::from_ymd_opt(2019, 7, 15).unwrap()),
        ];
        let a = engine().assess(&location(None), &reading(None, None), &floods, now);
        let historical = a
            .factors
            .iter()
            .find(|f| f.factor == FactorKind::HistoricalFloods)
            .unwrap();
        // only the flood on the window boundary counts
        assert_eq!(historical.value, 1.0);
        assert_eq!(historical.score, 5);
    }

    #[test]
    fn test_flood_window_from_leap_day() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(engine().flood_window_start(now), NaiveDate::from_ymd_opt(2019, 2, 28).unwrap());
    }

    #[test]
    fn test_assess_location_unknown_id() {
        let store = MemoryStore::new();
        let result = engine().assess_location(&store, 42, january());
        assert!(matches!(result, Err(ServiceError::LocationNotFound(42))));
    }

    #[test]
    fn test_assess_location_without_readings() {
        let store = MemoryStore::with_locations(vec![location(Some(5.0))]);
        let result = engine().assess_location(&store, 1, january()).unwrap();
        assert!(result.is_none());
        assert!(store.assessments_for(1).unwrap().is_empty());
    }

    #[test]
    fn test_assess_location_persists_and_sets_id() {
        let store = MemoryStore::with_locations(vec![location(Some(5.0))]);
        let obs = WeatherObservation {
            observed_at: january(),
            temperature_c: 3.0,
            humidity_pct: 95.0,
            rainfall_1h_mm: 12.0,
            wind_speed_ms: 6.0,
            pressure_hpa: 999.0,
            condition: "rain".to_string(),
        };
        let reading_id = store.insert_reading(1, &obs).unwrap();
        store.update_aggregate_fields(reading_id, 12.0, 12.0).unwrap();

        let a = engine().assess_location(&store, 1, january()).unwrap().unwrap();
        assert!(a.id.is_some());
        // 10 (24h) + 30 (elevation)
        assert_eq!(a.risk_score, 40);
        assert_eq!(a.risk_level, RiskLevel::Medium);

        let stored = latest_assessment(&store, 1).unwrap().unwrap();
        assert_eq!(stored, a);
    }

    #[test]
    fn test_assess_all_counts_locations_without_data() {
        let store = MemoryStore::with_locations(vec![location(Some(5.0))]);
        store
            .add_location(Location { id: 2, name: "Uplands".into(), latitude: 41.0, longitude: -89.0, elevation_m: None })
            .unwrap();
        let obs = WeatherObservation {
            observed_at: january(),
            temperature_c: 3.0,
            humidity_pct: 60.0,
            rainfall_1h_mm: 0.0,
            wind_speed_ms: 1.0,
            pressure_hpa: 1020.0,
            condition: "clear sky".to_string(),
        };
        store.insert_reading(1, &obs).unwrap();

        let summary = engine().assess_all(&store, january()).unwrap();
        assert_eq!(summary, ScoringSummary { assessed: 1, no_data: 1, failed: 0 });
    }
}
