/// Integration tests for risk scoring over stored data
///
/// Exercises the full path a location takes through the service: readings
/// are stored, aggregates recomputed, and the scoring engine reads both plus
/// the flood history back from the store.
///
/// Run with: cargo test --test risk_assessment

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use flood_risk_service::analysis::rainfall::{AggregationPolicy, RainfallAggregator};
use flood_risk_service::analysis::risk::{latest_assessment, RiskScoringEngine, ScoringSummary};
use flood_risk_service::model::{FactorKind, Location, RiskLevel, ServiceError, WeatherObservation};
use flood_risk_service::rules::{parse_rules, RuleTable};
use flood_risk_service::store::{CatalogStore, MemoryStore, ReadingStore};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Mid-August, inside the monsoon season of the default rules.
fn august_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 20, 12, 0, 0).unwrap()
}

fn riverbank() -> Location {
    Location {
        id: 1,
        name: "Riverbank".to_string(),
        latitude: 40.69,
        longitude: -89.59,
        elevation_m: Some(6.5),
    }
}

fn hilltop() -> Location {
    Location {
        id: 2,
        name: "Hilltop".to_string(),
        latitude: 40.75,
        longitude: -89.62,
        elevation_m: Some(210.0),
    }
}

fn rain_at(observed_at: DateTime<Utc>, mm: f64) -> WeatherObservation {
    WeatherObservation {
        observed_at,
        temperature_c: 26.0,
        humidity_pct: 97.0,
        rainfall_1h_mm: mm,
        wind_speed_ms: 7.5,
        pressure_hpa: 998.0,
        condition: "heavy intensity rain".to_string(),
    }
}

fn engine() -> RiskScoringEngine {
    RiskScoringEngine::new(Arc::new(RuleTable::default()))
}

/// Stores hourly readings ending at `now` and recomputes aggregates.
fn seed_rain(store: &MemoryStore, location_id: i32, now: DateTime<Utc>, hourly_mm: &[f64]) {
    for (hours_ago, mm) in hourly_mm.iter().rev().enumerate() {
        store
            .insert_reading(location_id, &rain_at(now - Duration::hours(hours_ago as i64), *mm))
            .unwrap();
    }
    let locations = store.list_locations().unwrap();
    RainfallAggregator::new(AggregationPolicy::Abort)
        .update_aggregates(store, &locations, now)
        .unwrap();
}

// ---------------------------------------------------------------------------
// Scoring from stored data
// ---------------------------------------------------------------------------

#[test]
fn test_storm_over_low_ground_is_critical() {
    let now = august_noon();
    let store = MemoryStore::with_locations(vec![riverbank()]);
    // 12 hours of 9mm/h = 108mm in the last day
    seed_rain(&store, 1, now, &[9.0; 12]);
    store.add_historical_flood(1, NaiveDate::from_ymd_opt(2022, 4, 2).unwrap()).unwrap();

    let assessment = engine().assess_location(&store, 1, now).unwrap().unwrap();

    // 40 (24h >= 100) + 20 (72h >= 100) + 30 (elev <= 10) + 15 (monsoon) + 5 (1 flood)
    assert_eq!(assessment.risk_score, 110);
    assert_eq!(assessment.risk_level, RiskLevel::Critical);
    assert_eq!(assessment.risk_color, "darkred");
    assert_eq!(assessment.rainfall_24h_mm, Some(108.0));
    assert_eq!(assessment.factors.len(), 5);
    assert_eq!(assessment.factors[0].factor, FactorKind::Rainfall24h);
    assert_eq!(assessment.factors[4].factor, FactorKind::HistoricalFloods);
}

#[test]
fn test_dry_hilltop_in_winter_has_no_factors() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
    let store = MemoryStore::with_locations(vec![hilltop()]);
    seed_rain(&store, 2, now, &[0.0, 0.5, 0.0]);

    let assessment = engine().assess_location(&store, 2, now).unwrap().unwrap();

    assert_eq!(assessment.risk_score, 0);
    assert!(assessment.factors.is_empty());
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.recommended_action, "Normal conditions. Continue routine monitoring.");
}

#[test]
fn test_unaggregated_reading_is_scored_from_live_window_sums() {
    let now = august_noon();
    let store = MemoryStore::with_locations(vec![riverbank()]);
    seed_rain(&store, 1, now - Duration::hours(1), &[20.0]);
    // ingested after the last aggregation pass
    let fresh = store.insert_reading(1, &rain_at(now, 40.0)).unwrap();

    let assessment = engine().assess_location(&store, 1, now).unwrap().unwrap();

    assert_eq!(assessment.rainfall_24h_mm, Some(60.0));
    assert_eq!(assessment.rainfall_72h_mm, Some(60.0));
    let r24 = assessment
        .factors
        .iter()
        .find(|f| f.factor == FactorKind::Rainfall24h)
        .expect("24h rainfall should score");
    assert_eq!(r24.label, "Heavy 24h rainfall");
    let r72 = assessment.factors.iter().find(|f| f.factor == FactorKind::Rainfall72h).unwrap();
    assert_eq!(r72.score, 10);

    // scoring never writes aggregates
    let stored = store.latest_reading(1).unwrap().unwrap();
    assert_eq!(stored.id, fresh);
    assert_eq!(stored.rainfall_24h_mm, None);
}

#[test]
fn test_no_reading_and_unknown_location() {
    let store = MemoryStore::with_locations(vec![riverbank()]);

    assert!(engine().assess_location(&store, 1, august_noon()).unwrap().is_none());
    assert!(matches!(
        engine().assess_location(&store, 77, august_noon()),
        Err(ServiceError::LocationNotFound(77))
    ));
}

#[test]
fn test_assessments_are_appended_and_latest_wins() {
    let now = august_noon();
    let store = MemoryStore::with_locations(vec![riverbank()]);
    seed_rain(&store, 1, now, &[3.0]);

    let first = engine().assess_location(&store, 1, now).unwrap().unwrap();
    let later = now + Duration::minutes(30);
    let second = engine().assess_location(&store, 1, later).unwrap().unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(store.assessments_for(1).unwrap().len(), 2);
    assert_eq!(latest_assessment(&store, 1).unwrap(), Some(second));
}

#[test]
fn test_assess_all_over_mixed_locations() {
    let now = august_noon();
    let store = MemoryStore::with_locations(vec![riverbank(), hilltop()]);
    seed_rain(&store, 1, now, &[4.0, 4.0]);

    let summary = engine().assess_all(&store, now).unwrap();

    assert_eq!(summary, ScoringSummary { assessed: 1, no_data: 1, failed: 0 });
}

// ---------------------------------------------------------------------------
// Rule files
// ---------------------------------------------------------------------------

#[test]
fn test_custom_rule_file_changes_outcome() {
    let rules = parse_rules(
        r#"
        version = "test-1"
        historical_window_years = 2

        rainfall_24h = [ { min = 5.0, score = 50, label = "Local threshold" } ]
        rainfall_72h = []
        elevation = []
        season = []
        historical_floods = [ { min_floods = 1, score = 10, label = "Recent flood" } ]

        [[risk_tiers]]
        min_score = 50
        level = "HIGH"
        color = "red"
        action = "Prepare for evacuation."

        [[risk_tiers]]
        min_score = 0
        level = "LOW"
        color = "green"
        action = "Routine monitoring."
        "#,
    )
    .unwrap();
    let engine = RiskScoringEngine::new(Arc::new(rules));

    let now = august_noon();
    let store = MemoryStore::with_locations(vec![riverbank()]);
    seed_rain(&store, 1, now, &[6.0]);
    // outside the two-year window
    store.add_historical_flood(1, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()).unwrap();

    let assessment = engine.assess_location(&store, 1, now).unwrap().unwrap();

    assert_eq!(assessment.rules_version, "test-1");
    assert_eq!(assessment.risk_score, 50);
    assert_eq!(assessment.risk_level, RiskLevel::High);
    assert_eq!(assessment.factors.len(), 1);
    assert_eq!(assessment.factors[0].label, "Local threshold");
}
