/// HTTP endpoint for querying flood risk
///
/// A small REST surface for dashboards and scripts to read the latest risk
/// assessment per location and to request an immediate re-assessment.
///
/// Endpoints:
/// - GET  /health                - Service health check
/// - GET  /locations/{id}/risk   - Latest stored assessment (404 if none)
/// - POST /locations/{id}/risk   - Score the location now and store the result

use chrono::Utc;
use std::sync::Arc;
use tiny_http::Method;

use crate::analysis::risk::{latest_assessment, RiskScoringEngine};
use crate::model::ServiceError;
use crate::store::Store;

type JsonResponse = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A parsed request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    LatestRisk(i32),
    AssessRisk(i32),
    /// Known path, wrong method.
    MethodNotAllowed,
    NotFound,
}

/// Maps a method and URL onto a route. Query strings are ignored.
pub fn route(method: &Method, url: &str) -> Route {
    let path = url.split('?').next().unwrap_or("");

    if path == "/health" {
        return match method {
            Method::Get => Route::Health,
            _ => Route::MethodNotAllowed,
        };
    }

    let location_id = path
        .strip_prefix("/locations/")
        .and_then(|rest| rest.strip_suffix("/risk"))
        .and_then(|id| id.parse::<i32>().ok());

    match (location_id, method) {
        (Some(id), Method::Get) => Route::LatestRisk(id),
        (Some(id), Method::Post) => Route::AssessRisk(id),
        (Some(_), _) => Route::MethodNotAllowed,
        (None, _) => Route::NotFound,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Shared state for request handlers.
pub struct RiskEndpoint {
    store: Arc<dyn Store>,
    scorer: RiskScoringEngine,
}

impl RiskEndpoint {
    pub fn new(store: Arc<dyn Store>, scorer: RiskScoringEngine) -> Self {
        Self { store, scorer }
    }

    /// Produces the status code and JSON body for a route.
    pub fn handle(&self, route: Route) -> (u16, serde_json::Value) {
        match route {
            Route::Health => handle_health(),
            Route::LatestRisk(id) => self.handle_latest(id),
            Route::AssessRisk(id) => self.handle_assess(id),
            Route::MethodNotAllowed => (405, serde_json::json!({ "error": "Method not allowed" })),
            Route::NotFound => (
                404,
                serde_json::json!({
                    "error": "Not found",
                    "available_endpoints": ["/health", "/locations/{id}/risk"]
                }),
            ),
        }
    }

    fn handle_latest(&self, location_id: i32) -> (u16, serde_json::Value) {
        match latest_assessment(self.store.as_ref(), location_id) {
            Ok(Some(assessment)) => (200, to_json(&assessment)),
            Ok(None) => (
                404,
                serde_json::json!({
                    "error": "No risk assessment available",
                    "location_id": location_id
                }),
            ),
            Err(e) => error_response(&e, location_id),
        }
    }

    fn handle_assess(&self, location_id: i32) -> (u16, serde_json::Value) {
        match self.scorer.assess_location(self.store.as_ref(), location_id, Utc::now()) {
            Ok(Some(assessment)) => (200, to_json(&assessment)),
            Ok(None) => (
                409,
                serde_json::json!({
                    "error": "No weather data available for this location",
                    "location_id": location_id
                }),
            ),
            Err(e) => error_response(&e, location_id),
        }
    }
}

fn handle_health() -> (u16, serde_json::Value) {
    (
        200,
        serde_json::json!({
            "status": "ok",
            "service": "flood_risk_service",
            "version": env!("CARGO_PKG_VERSION")
        }),
    )
}

fn error_response(err: &ServiceError, location_id: i32) -> (u16, serde_json::Value) {
    let status = match err {
        ServiceError::LocationNotFound(_) => 404,
        ServiceError::Configuration(_) | ServiceError::Persistence(_) => 500,
    };
    if status == 500 {
        log::error!("Request for location {} failed: {}", location_id, err);
    }
    (
        status,
        serde_json::json!({
            "error": err.to_string(),
            "location_id": location_id
        }),
    )
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks forever.
pub fn start_endpoint_server(port: u16, endpoint: RiskEndpoint) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    println!("   GET  /locations/{{id}}/risk - Latest risk assessment");
    println!("   POST /locations/{{id}}/risk - Assess risk now");
    println!("   GET  /health - Service health check\n");

    for request in server.incoming_requests() {
        let route = route(request.method(), request.url());
        log::debug!("{} {} -> {:?}", request.method(), request.url(), route);

        let (status, body) = endpoint.handle(route);
        if let Err(e) = request.respond(create_response(status, &body)) {
            log::warn!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &serde_json::Value) -> JsonResponse {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());

    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(_) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, WeatherObservation};
    use crate::rules::RuleTable;
    use crate::store::{MemoryStore, ReadingStore};

    fn endpoint_with(store: Arc<MemoryStore>) -> RiskEndpoint {
        RiskEndpoint::new(store, RiskScoringEngine::new(Arc::new(RuleTable::default())))
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::with_locations(vec![Location {
            id: 3,
            name: "Lowlands".to_string(),
            latitude: 40.1,
            longitude: -88.2,
            elevation_m: Some(45.0),
        }]));
        let id = store
            .insert_reading(
                3,
                &WeatherObservation {
                    observed_at: Utc::now(),
                    temperature_c: 20.0,
                    humidity_pct: 90.0,
                    rainfall_1h_mm: 30.0,
                    wind_speed_ms: 5.0,
                    pressure_hpa: 1001.0,
                    condition: "heavy intensity rain".to_string(),
                },
            )
            .unwrap();
        store.update_aggregate_fields(id, 30.0, 30.0).unwrap();
        store
    }

    #[test]
    fn test_routing() {
        assert_eq!(route(&Method::Get, "/health"), Route::Health);
        assert_eq!(route(&Method::Get, "/locations/12/risk"), Route::LatestRisk(12));
        assert_eq!(route(&Method::Post, "/locations/12/risk"), Route::AssessRisk(12));
        assert_eq!(route(&Method::Get, "/locations/12/risk?fresh=1"), Route::LatestRisk(12));
        assert_eq!(route(&Method::Delete, "/locations/12/risk"), Route::MethodNotAllowed);
        assert_eq!(route(&Method::Get, "/locations/abc/risk"), Route::NotFound);
        assert_eq!(route(&Method::Get, "/site/05568500"), Route::NotFound);
    }

    #[test]
    fn test_latest_risk_is_404_before_any_assessment() {
        let endpoint = endpoint_with(seeded_store());
        let (status, body) = endpoint.handle(Route::LatestRisk(3));
        assert_eq!(status, 404);
        assert_eq!(body["location_id"], 3);
    }

    #[test]
    fn test_post_then_get_returns_same_assessment() {
        let endpoint = endpoint_with(seeded_store());

        let (status, posted) = endpoint.handle(Route::AssessRisk(3));
        assert_eq!(status, 200);
        assert_eq!(posted["risk_level"], "MEDIUM");

        let (status, latest) = endpoint.handle(Route::LatestRisk(3));
        assert_eq!(status, 200);
        assert_eq!(latest, posted);
    }

    #[test]
    fn test_post_unknown_location_is_404() {
        let endpoint = endpoint_with(seeded_store());
        let (status, body) = endpoint.handle(Route::AssessRisk(99));
        assert_eq!(status, 404);
        assert!(body["error"].as_str().unwrap().contains("99"));
    }

    #[test]
    fn test_health() {
        let (status, body) = handle_health();
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }
}
