//! Integration tests for the product registry routes: dispatch, follow the
//! redirect to the result stream, then query.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestServer, get_json, get_text, post_json, sse_events};

fn test_product() -> serde_json::Value {
    json!({
        "product_id": "12345",
        "name": "Test Product",
        "description": "A product for testing."
    })
}

/// Posts `body` to `uri` and returns the events streamed for it.
async fn dispatch(
    server: &TestServer,
    uri: &str,
    body: &serde_json::Value,
) -> Vec<(String, serde_json::Value)> {
    let (status, location) = post_json(server.app.clone(), uri, body).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = location.unwrap();
    assert!(location.starts_with("/api/v1/products/events?correlation_id="));

    let (status, body) = get_text(server.app.clone(), &location).await;
    assert_eq!(status, StatusCode::OK);
    sse_events(&body)
}

#[tokio::test]
async fn test_register_product_streams_product_registered() {
    // Arrange
    let server = TestServer::start();

    // Act
    let events = dispatch(&server, "/api/v1/products/register", &test_product()).await;

    // Assert
    assert_eq!(events.len(), 1);
    let (name, data) = &events[0];
    assert_eq!(name, "ProductRegistered");
    assert_eq!(data["product_id"], "12345");
    assert_eq!(data["name"], "Test Product");
    assert_eq!(data["version"], 1);
    assert_eq!(data["registry_id"], server.registry_id.to_string());
    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_registration_streams_error_event() {
    let server = TestServer::start();
    dispatch(&server, "/api/v1/products/register", &test_product()).await;

    let events = dispatch(&server, "/api/v1/products/register", &test_product()).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert_eq!(events[0].1["code"], "duplicate_product_id");
    assert_eq!(server.repository.events(server.registry_id).len(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_registered_product_is_queryable_until_removed() {
    // Arrange
    let server = TestServer::start();
    dispatch(&server, "/api/v1/products/register", &test_product()).await;

    // Act
    let (status, product) = get_json(server.app.clone(), "/api/v1/products/12345").await;
    let (_, registry) = get_json(server.app.clone(), "/api/v1/products").await;
    let removed = dispatch(
        &server,
        "/api/v1/products/remove",
        &json!({ "product_id": "12345" }),
    )
    .await;
    let (status_after_remove, _) = get_json(server.app.clone(), "/api/v1/products/12345").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["name"], "Test Product");
    assert_eq!(registry["version"], 1);
    assert_eq!(registry["products"].as_array().unwrap().len(), 1);
    assert_eq!(removed[0].0, "ProductRemoved");
    assert_eq!(removed[0].1["version"], 2);
    assert_eq!(status_after_remove, StatusCode::NOT_FOUND);
    server.stop().await;
}

#[tokio::test]
async fn test_update_of_unknown_product_streams_product_not_found() {
    let server = TestServer::start();

    let events = dispatch(&server, "/api/v1/products/update", &test_product()).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert_eq!(events[0].1["code"], "product_not_found");
    server.stop().await;
}

#[tokio::test]
async fn test_stream_for_unused_correlation_id_completes_empty() {
    let server = TestServer::start();
    let uri = format!(
        "/api/v1/products/events?correlation_id={}",
        uuid::Uuid::new_v4()
    );

    let (status, body) = get_text(server.app.clone(), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert!(sse_events(&body).is_empty());
    assert_eq!(server.broker.open_channel_count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_blank_product_id_returns_400_validation_error() {
    let server = TestServer::start();
    let body = json!({ "product_id": " ", "name": "n", "description": "d" });

    let (status, location) =
        post_json(server.app.clone(), "/api/v1/products/register", &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(location.is_none());
    server.stop().await;
}
