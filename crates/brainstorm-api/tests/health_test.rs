//! Integration tests for the health endpoint.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use brainstorm_api::routes;
use brainstorm_api::state::AppState;
use brainstorm_core::clock::Clock;
use brainstorm_event_store::memory_event_repository::InMemoryEventRepository;
use brainstorm_test_support::{FailingEventRepository, FixedClock, fixed_now};

#[tokio::test]
async fn test_health_returns_200_with_status_ok() {
    let app = common::build_test_app(&common::store());

    let (status, json) = common::get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_unreachable_store() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    let app = routes::app(AppState::new(
        clock,
        Arc::new(FailingEventRepository),
        Arc::new(InMemoryEventRepository::new()),
    ));

    let (status, json) = common::get_json(app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store"], "unavailable");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = common::build_test_app(&common::store());

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/nonexistent")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
