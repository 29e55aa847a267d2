//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status: `ok` or `degraded`.
    pub status: &'static str,
    /// Event store reachability: `ok` or `unavailable`.
    pub store: &'static str,
    /// Service version.
    pub version: String,
}

/// GET /health
///
/// Probes the event store with a read of an empty stream.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status, store) = match state.event_repository.load_events(Uuid::nil()).await
    {
        Ok(_) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            warn!(error = %e, "health check could not reach the event store");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            store,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
