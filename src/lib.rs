/// flood_risk_service: weather ingestion and rule-based flood risk scoring.
///
/// # Module structure
///
/// ```text
/// flood_risk_service
/// ├── model       — shared data types (Location, WeatherReading, RiskAssessment, FetchError, …)
/// ├── rules       — ordered, versioned risk rule table (risk_rules.toml)
/// ├── config      — service configuration loader (floodwatch.toml, .env)
/// ├── db          — PostgreSQL connection and schema validation
/// ├── store
/// │   ├── memory  — in-process store for tests and dry runs
/// │   └── pg      — PostgreSQL-backed store
/// ├── ingest
/// │   ├── openweather — OpenWeather current weather API: URL construction + JSON parsing
/// │   ├── pacing      — fixed-delay rate limiter for outbound calls
/// │   ├── pipeline    — one ingestion cycle over all locations
/// │   └── fixtures (test only) — representative API response payloads
/// ├── analysis
/// │   ├── rainfall — trailing 24h/72h rainfall aggregation
/// │   └── risk     — risk scoring engine and assessment persistence
/// ├── scheduler   — non-overlapping cycle runner with a catch-all failure boundary
/// └── endpoint    — HTTP API for reading and requesting risk assessments
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod ingest;
pub mod model;
pub mod rules;
pub mod scheduler;
pub mod store;
