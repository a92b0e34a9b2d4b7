/// Test fixtures: representative JSON payloads from the OpenWeather
/// current weather API (`/data/2.5/weather?units=metric`).
///
/// Response shape (fields we use):
///   main.temp          — Celsius
///   main.humidity      — percent
///   main.pressure      — hPa
///   wind.speed         — m/s
///   rain["1h"]         — mm over the last hour; the whole `rain` object is
///                        omitted when it is not raining
///   weather[0].description
///
/// The payloads keep the surrounding fields the real API sends so the
/// parser is exercised against unknown keys.

/// Heavy rain over Peoria, IL with a `rain.1h` value.
pub(crate) fn current_weather_rain_json() -> &'static str {
    r#"{
      "coord": { "lon": -89.589, "lat": 40.6936 },
      "weather": [
        { "id": 502, "main": "Rain", "description": "heavy intensity rain", "icon": "10d" }
      ],
      "base": "stations",
      "main": {
        "temp": 24.3, "feels_like": 25.1, "temp_min": 23.0, "temp_max": 25.6,
        "pressure": 1002, "humidity": 94
      },
      "visibility": 4000,
      "wind": { "speed": 5.1, "deg": 200, "gust": 9.8 },
      "rain": { "1h": 7.62 },
      "clouds": { "all": 100 },
      "dt": 1717430400,
      "sys": { "country": "US", "sunrise": 1717411122, "sunset": 1717464321 },
      "timezone": -18000,
      "id": 4905687,
      "name": "Peoria",
      "cod": 200
    }"#
}

/// Clear sky: no `rain` object at all.
pub(crate) fn current_weather_dry_json() -> &'static str {
    r#"{
      "coord": { "lon": -89.589, "lat": 40.6936 },
      "weather": [
        { "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }
      ],
      "main": { "temp": 18.0, "pressure": 1019, "humidity": 41 },
      "wind": { "speed": 2.6, "deg": 310 },
      "dt": 1717430400,
      "name": "Peoria",
      "cod": 200
    }"#
}

/// Rain reported only as a 3-hour accumulation.
pub(crate) fn current_weather_rain_3h_only_json() -> &'static str {
    r#"{
      "weather": [ { "id": 500, "main": "Rain", "description": "light rain" } ],
      "main": { "temp": 15.2, "pressure": 1011, "humidity": 88 },
      "wind": { "speed": 3.4 },
      "rain": { "3h": 2.1 },
      "cod": 200
    }"#
}

/// Truncated payload without the `main` block.
pub(crate) fn current_weather_missing_main_json() -> &'static str {
    r#"{
      "weather": [ { "id": 800, "main": "Clear", "description": "clear sky" } ],
      "wind": { "speed": 1.0 },
      "cod": 200
    }"#
}

/// Structurally complete but with an empty `weather` array.
pub(crate) fn current_weather_no_condition_json() -> &'static str {
    r#"{
      "weather": [],
      "main": { "temp": 10.0, "pressure": 1015, "humidity": 70 },
      "wind": { "speed": 1.5 },
      "cod": 200
    }"#
}
