/// Core data types for the flood risk service.
///
/// This module defines the shared domain model imported by all other modules:
/// locations, weather readings, historical floods, risk assessments and the
/// error taxonomy that crosses component boundaries. It contains no I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A monitored geographic location.
///
/// Owned by the upstream location catalog; the service only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i32,
    pub name: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Elevation above sea level in meters, if surveyed.
    pub elevation_m: Option<f64>,
}

/// A recorded flood event at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFlood {
    pub id: i64,
    pub location_id: i32,
    pub flood_date: NaiveDate,
    pub severity: Option<String>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// A point-in-time observation returned by a weather source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Wall-clock time the observation was fetched.
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    /// Rainfall over the last hour in mm (0 when the provider omits it).
    pub rainfall_1h_mm: f64,
    pub wind_speed_ms: f64,
    pub pressure_hpa: f64,
    pub condition: String,
}

/// A stored weather observation for a location.
///
/// `rainfall_24h_mm` and `rainfall_72h_mm` are derived: they stay `None`
/// until the rainfall aggregator writes them onto the latest reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub id: i64,
    pub location_id: i32,
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rainfall_1h_mm: f64,
    pub wind_speed_ms: f64,
    pub pressure_hpa: f64,
    pub condition: String,
    pub rainfall_24h_mm: Option<f64>,
    pub rainfall_72h_mm: Option<f64>,
}

impl WeatherReading {
    /// Builds the stored form of an observation once the store has assigned an id.
    pub fn from_observation(id: i64, location_id: i32, obs: &WeatherObservation) -> Self {
        WeatherReading {
            id,
            location_id,
            timestamp: obs.observed_at,
            temperature_c: obs.temperature_c,
            humidity_pct: obs.humidity_pct,
            rainfall_1h_mm: obs.rainfall_1h_mm,
            wind_speed_ms: obs.wind_speed_ms,
            pressure_hpa: obs.pressure_hpa,
            condition: obs.condition.clone(),
            rainfall_24h_mm: None,
            rainfall_72h_mm: None,
        }
    }
}

/// Trailing rainfall windows, in hours, written onto the latest reading.
pub const WINDOW_24H: i64 = 24;
pub const WINDOW_72H: i64 = 72;

/// Aggregate sums written onto a location's latest reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainfallTotals {
    pub reading_id: i64,
    pub rainfall_24h_mm: f64,
    pub rainfall_72h_mm: f64,
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

/// Discrete flood-risk severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five independent contributors to a risk score, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    #[serde(rename = "rainfall_24h")]
    Rainfall24h,
    #[serde(rename = "rainfall_72h")]
    Rainfall72h,
    Elevation,
    Season,
    #[serde(rename = "historical")]
    HistoricalFloods,
}

impl FactorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Rainfall24h => "rainfall_24h",
            FactorKind::Rainfall72h => "rainfall_72h",
            FactorKind::Elevation => "elevation",
            FactorKind::Season => "season",
            FactorKind::HistoricalFloods => "historical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rainfall_24h" => Some(FactorKind::Rainfall24h),
            "rainfall_72h" => Some(FactorKind::Rainfall72h),
            "elevation" => Some(FactorKind::Elevation),
            "season" => Some(FactorKind::Season),
            "historical" => Some(FactorKind::HistoricalFloods),
            _ => None,
        }
    }
}

/// One named contributor to an assessment's total score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: FactorKind,
    pub score: u32,
    pub label: String,
    /// Observed value: mm for rainfall, meters for elevation, month
    /// number for season, flood count for historical.
    pub value: f64,
}

/// The outcome of scoring one location at one instant.
///
/// Assessments are appended, never updated. `id` is `None` until the
/// assessment has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Option<i64>,
    pub location_id: i32,
    pub assessed_at: DateTime<Utc>,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_color: String,
    pub recommended_action: String,
    pub factors: Vec<RiskFactor>,
    pub rainfall_24h_mm: Option<f64>,
    pub rainfall_72h_mm: Option<f64>,
    pub rules_version: String,
}

// ---------------------------------------------------------------------------
// System log
// ---------------------------------------------------------------------------

/// A persisted record of a cycle-level failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub log_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub logged_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors a weather source can report for a single fetch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("weather API timeout")]
    Timeout,
    /// The provider rejected the API key (HTTP 401).
    #[error("weather API rejected credentials (invalid API key)")]
    Unauthorized,
    /// The provider throttled us (HTTP 429).
    #[error("weather API rate limit exceeded")]
    RateLimited,
    /// Any other non-2xx status.
    #[error("weather API HTTP error: {0}")]
    Http(u16),
    /// The request was sent but no response came back.
    #[error("weather API not responding")]
    NoResponse,
    /// The body was not the JSON shape we expect.
    #[error("malformed weather API response: {0}")]
    MalformedResponse(String),
    /// No API key is configured.
    #[error("weather API key not configured (set OPENWEATHER_API_KEY)")]
    MissingApiKey,
    #[error("invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

impl FetchError {
    /// True for failures that make every remaining fetch in the cycle pointless.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, FetchError::Unauthorized | FetchError::MissingApiKey)
    }

    /// Short machine-friendly kind name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Unauthorized => "unauthorized",
            FetchError::RateLimited => "rate_limited",
            FetchError::Http(_) => "http",
            FetchError::NoResponse => "no_response",
            FetchError::MalformedResponse(_) => "malformed_response",
            FetchError::MissingApiKey => "missing_api_key",
            FetchError::InvalidCoordinates { .. } => "invalid_coordinates",
        }
    }
}

/// Errors surfaced by the ingestion, aggregation and scoring components.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Credentials are missing or rejected; the whole cycle is aborted.
    #[error("configuration error: {0}")]
    Configuration(#[source] FetchError),
    #[error("location {0} not found")]
    LocationNotFound(i32),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl ServiceError {
    /// Log type recorded in the system log for this error.
    pub fn log_type(&self) -> &'static str {
        match self {
            ServiceError::Configuration(_) => "CONFIGURATION_ERROR",
            ServiceError::LocationNotFound(_) => "NOT_FOUND_ERROR",
            ServiceError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_credential_failures_are_cycle_fatal() {
        assert!(FetchError::Unauthorized.is_cycle_fatal());
        assert!(FetchError::MissingApiKey.is_cycle_fatal());

        assert!(!FetchError::Timeout.is_cycle_fatal());
        assert!(!FetchError::RateLimited.is_cycle_fatal());
        assert!(!FetchError::Http(503).is_cycle_fatal());
        assert!(!FetchError::NoResponse.is_cycle_fatal());
        assert!(!FetchError::MalformedResponse("x".into()).is_cycle_fatal());
        assert!(!FetchError::InvalidCoordinates { latitude: 91.0, longitude: 0.0 }.is_cycle_fatal());
    }

    #[test]
    fn test_http_error_preserves_status() {
        let err = FetchError::Http(502);
        assert_eq!(err, FetchError::Http(502));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_risk_level_ordering_and_names() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            assert_eq!(RiskLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"HIGH\"");
    }

    #[test]
    fn test_factor_kind_names_match_serde() {
        for kind in [
            FactorKind::Rainfall24h,
            FactorKind::Rainfall72h,
            FactorKind::Elevation,
            FactorKind::Season,
            FactorKind::HistoricalFloods,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(FactorKind::parse(kind.as_str()), Some(kind));
        }
    }
}
