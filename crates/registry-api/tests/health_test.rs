//! Integration tests for the health endpoint.

mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn test_health_returns_200_with_status_ok() {
    let server = common::TestServer::start();

    let (status, json) = common::get_json(server.app.clone(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let server = common::TestServer::start();

    let (status, _) = common::get_text(server.app.clone(), "/api/v1/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    server.stop().await;
}
