//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use brainstorm_core::clock::Clock;
use brainstorm_event_store::memory_event_repository::InMemoryEventRepository;
use brainstorm_test_support::{FixedClock, fixed_now};
use http_body_util::BodyExt;
use tower::ServiceExt;

use brainstorm_api::routes;
use brainstorm_api::state::AppState;

/// A store shared by every app built from it, so consecutive requests see
/// each other's writes.
pub fn store() -> Arc<InMemoryEventRepository> {
    Arc::new(InMemoryEventRepository::new())
}

/// Build the full app router over `store` with a fixed clock. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app(store: &Arc<InMemoryEventRepository>) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    routes::app(AppState::with_store(clock, Arc::clone(store)))
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get_raw(app, uri).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    (status, json)
}

/// Send a GET request and return status, content type and raw body.
pub async fn get_raw(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_owned());
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, content_type, body_bytes.to_vec())
}
