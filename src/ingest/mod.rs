/// Weather ingestion.
///
/// Submodules:
/// - `openweather` — OpenWeather current-conditions API: URL construction,
///   JSON parsing, failure classification
/// - `pacing`      — fixed-delay rate limiter shared by outbound calls
/// - `pipeline`    — one ingestion cycle across all locations
/// - `fixtures` (test only) — representative API response payloads
///
/// Other weather providers get their own file under ingest/ and implement
/// `WeatherSource`.

pub mod openweather;
pub mod pacing;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::model::{FetchError, WeatherObservation};

/// A provider of point-in-time weather observations.
///
/// Implementations make exactly one attempt per call; retry policy is
/// left to the caller.
pub trait WeatherSource: Send + Sync {
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<WeatherObservation, FetchError>;
}

/// Rejects coordinates outside WGS84 bounds before any network call.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), FetchError> {
    let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
    let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(FetchError::InvalidCoordinates { latitude, longitude })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(validate_coordinates(40.69, -89.59).is_ok());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());

        assert!(validate_coordinates(90.01, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }
}
