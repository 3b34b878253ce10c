//! Integration tests for the root and health endpoints

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use tower::ServiceExt;

use common::{json_body, text_body, TestApp};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_endpoint() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(text_body(response).await.contains("PlayCo"));
}

#[tokio::test]
async fn test_simple_health_check() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "OK");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/health/live")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "alive");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_readiness_reports_token_store() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/health/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"][0]["name"], "token_store");
    assert_eq!(body["services"][0]["details"]["backend"], "memory");
}

#[tokio::test]
async fn test_realtime_endpoint_requires_upgrade() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(get(playco_api::REALTIME_PATH))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
