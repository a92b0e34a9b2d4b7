/// OpenWeather current-conditions API client.
///
/// One GET per fetch against the current weather endpoint:
///   https://api.openweathermap.org/data/2.5/weather?lat=..&lon=..&appid=..&units=metric
///
/// Failures are classified into `FetchError` kinds so the pipeline can tell
/// a rejected API key (abort the cycle) from a slow or flaky upstream
/// (skip the location). See `fixtures.rs` for the response shape.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::{validate_coordinates, WeatherSource};
use crate::model::{FetchError, WeatherObservation};

pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

// ---------------------------------------------------------------------------
// Serde structures for the current weather response
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CurrentResponse {
    main: MainBlock,
    wind: WindBlock,
    rain: Option<RainBlock>,
    weather: Vec<ConditionBlock>,
}

#[derive(Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Deserialize)]
struct WindBlock {
    speed: f64,
}

#[derive(Deserialize)]
struct RainBlock {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Deserialize)]
struct ConditionBlock {
    description: String,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds the current-weather URL. Metric units are always requested.
pub fn build_weather_url(base_url: &str, latitude: f64, longitude: f64, api_key: &str) -> String {
    format!(
        "{}?lat={}&lon={}&appid={}&units=metric",
        base_url,
        latitude,
        longitude,
        urlencoding::encode(api_key)
    )
}

// ---------------------------------------------------------------------------
// Response parsing and classification
// ---------------------------------------------------------------------------

/// Parses a current-weather JSON body into an observation stamped with
/// `observed_at`. Missing rain data means no rain.
///
/// # Errors
/// `FetchError::MalformedResponse` when required fields are missing or the
/// body is not JSON.
pub fn parse_current_response(json: &str, observed_at: DateTime<Utc>) -> Result<WeatherObservation, FetchError> {
    let response: CurrentResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::MalformedResponse(format!("JSON deserialization failed: {}", e)))?;

    let condition = response
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::MalformedResponse("missing weather condition".to_string()))?
        .description;

    let rainfall_1h_mm = response
        .rain
        .and_then(|r| r.one_hour)
        .unwrap_or(0.0);

    Ok(WeatherObservation {
        observed_at,
        temperature_c: response.main.temp,
        humidity_pct: response.main.humidity,
        rainfall_1h_mm,
        wind_speed_ms: response.wind.speed,
        pressure_hpa: response.main.pressure,
        condition,
    })
}

/// Maps a non-success HTTP status to its failure kind.
pub fn classify_status(status: u16) -> FetchError {
    match status {
        401 => FetchError::Unauthorized,
        429 => FetchError::RateLimited,
        code => FetchError::Http(code),
    }
}

/// Maps a transport-level reqwest error to its failure kind.
fn classify_transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_decode() || err.is_body() {
        FetchError::MalformedResponse(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status.as_u16())
    } else {
        // connect failures, resets, DNS: the request never got an answer
        FetchError::NoResponse
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// `WeatherSource` backed by the OpenWeather HTTP API.
pub struct OpenWeatherSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherSource {
    /// Creates a source with a bounded per-request timeout. A missing key is
    /// accepted here and reported as `FetchError::MissingApiKey` on fetch.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

impl WeatherSource for OpenWeatherSource {
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<WeatherObservation, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;
        validate_coordinates(latitude, longitude)?;

        log::debug!("Fetching weather for ({}, {})", latitude, longitude);

        let url = build_weather_url(&self.base_url, latitude, longitude, api_key);
        let observed_at = Utc::now();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16()));
        }

        let body = response.text().map_err(|e| classify_transport_error(&e))?;
        parse_current_response(&body, observed_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
