use crate::config::ApiConfig;
use crate::store::{FlightStore, FlightWithWaypoints, Waypoint};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FlightStore>,
}

/// Waypoint in API responses. The flight foreign key is internal and is
/// stripped before external exposure.
#[derive(Debug, Serialize)]
pub struct WaypointResponse {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "trashScore")]
    pub trash_score: i64,
    #[serde(rename = "scoreUnavailable")]
    pub score_unavailable: bool,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub timestamp: String,
}

impl From<Waypoint> for WaypointResponse {
    fn from(w: Waypoint) -> Self {
        Self {
            id: w.id,
            lat: w.lat,
            lng: w.lng,
            trash_score: w.trash_score,
            score_unavailable: w.score_unavailable,
            image_url: w.image_url,
            timestamp: w.timestamp,
        }
    }
}

/// Flight with nested waypoints in API responses
#[derive(Debug, Serialize)]
pub struct FlightResponse {
    pub id: String,
    pub date: String,
    pub waypoints: Vec<WaypointResponse>,
}

impl From<FlightWithWaypoints> for FlightResponse {
    fn from(f: FlightWithWaypoints) -> Self {
        Self {
            id: f.flight.id,
            date: f.flight.date,
            waypoints: f.waypoints.into_iter().map(Into::into).collect(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/flights", get(list_flights))
        .route("/flights/:flight_id", get(get_flight))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint confirming the API is up
async fn home() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "success",
        "message": "Skysweep flight path API is operational.",
        "endpoints": {
            "all_flights": "/flights",
            "specific_flight": "/flights/{flight_id}"
        }
    }))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "skysweep-ingest"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// List all flights with nested waypoints
async fn list_flights(
    State(state): State<AppState>,
) -> Result<Json<Vec<FlightResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let flights = state.store.list_flights().await.map_err(|e| {
        error!(error = %e, "Failed to list flights");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to list flights".to_string(),
                code: "QUERY_ERROR".to_string(),
            }),
        )
    })?;

    Ok(Json(flights.into_iter().map(Into::into).collect()))
}

/// Get a single flight by id
async fn get_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> Result<Json<FlightResponse>, (StatusCode, Json<ErrorResponse>)> {
    let flight = state.store.get_flight(&flight_id).await.map_err(|e| {
        error!(error = %e, "Failed to get flight");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to get flight".to_string(),
                code: "QUERY_ERROR".to_string(),
            }),
        )
    })?;

    match flight {
        Some(f) => Ok(Json(f.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Flight '{flight_id}' not found"),
                code: "NOT_FOUND".to_string(),
            }),
        )),
    }
}

/// Start the read API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting read API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router).await.context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Flight;

    #[test]
    fn test_waypoint_response_strips_flight_id() {
        let waypoint = Waypoint {
            id: "img-42".to_string(),
            flight_id: "flight-2025-10-11".to_string(),
            lat: 34.09,
            lng: 74.87,
            trash_score: 37,
            score_unavailable: false,
            image_url: Some("https://bucket.example/img-42".to_string()),
            timestamp: "15:50:57".to_string(),
        };

        let json = serde_json::to_value(WaypointResponse::from(waypoint)).unwrap();
        let object = json.as_object().unwrap();

        assert!(!object.contains_key("flight_id"));
        assert_eq!(object["trashScore"], 37);
        assert_eq!(object["scoreUnavailable"], false);
        assert_eq!(object["imageUrl"], "https://bucket.example/img-42");
        assert_eq!(object["timestamp"], "15:50:57");
    }

    #[test]
    fn test_flight_response_nests_waypoints() {
        let flight = FlightWithWaypoints {
            flight: Flight {
                id: "flight-2025-10-11".to_string(),
                date: "2025-10-11".to_string(),
            },
            waypoints: vec![],
        };

        let json = serde_json::to_value(FlightResponse::from(flight)).unwrap();
        assert_eq!(json["id"], "flight-2025-10-11");
        assert_eq!(json["date"], "2025-10-11");
        assert!(json["waypoints"].as_array().unwrap().is_empty());
    }
}
