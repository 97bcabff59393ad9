//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use product_registry::application::command_consumer::CommandConsumer;
use product_registry::application::command_handlers::RegistryCommandHandler;
use product_registry::application::event_router::EventRouter;
use registry_api::build_router;
use registry_api::state::AppState;
use registry_messaging::InMemoryBroker;
use registry_test_support::{FixedClock, InMemoryEventRepository};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

/// Quiet timeout used by test streams.
pub const QUIET: Duration = Duration::from_millis(300);

/// A full server wired to the in-process broker and an in-memory store.
pub struct TestServer {
    pub app: Router,
    pub broker: InMemoryBroker,
    pub repository: Arc<InMemoryEventRepository>,
    pub registry_id: Uuid,
    shutdown: watch::Sender<bool>,
    consumer: JoinHandle<()>,
}

impl TestServer {
    /// Builds the app and starts the command consumer. Uses the same wiring
    /// as `main.rs`.
    pub fn start() -> Self {
        let broker = InMemoryBroker::default();
        let repository = Arc::new(InMemoryEventRepository::new());
        let registry_id = Uuid::new_v4();
        let handler = Arc::new(RegistryCommandHandler::new(
            repository.clone(),
            Arc::new(FixedClock::default()),
        ));
        let consumer = CommandConsumer::new(
            registry_id,
            handler,
            EventRouter::new(Arc::new(broker.clone())),
        );
        let receiver = broker.command_receiver().unwrap();
        let (shutdown, signal) = watch::channel(false);
        let consumer = tokio::spawn(async move {
            consumer.run(receiver, signal).await.unwrap();
        });

        let app = build_router(AppState::new(
            registry_id,
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
            repository.clone(),
            QUIET,
        ));
        Self {
            app,
            broker,
            repository,
            registry_id,
            shutdown,
            consumer,
        }
    }

    /// Stops the consumer and waits for it.
    pub async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.consumer.await.unwrap();
    }
}

/// Send a POST request with a JSON body; returns the status and the
/// `Location` header, if any.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, Option<String>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap().to_owned());

    (response.status(), location)
}

/// Send a GET request and return the response body as text.
pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, String::from_utf8(body_bytes.to_vec()).unwrap())
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, text) = get_text(app, uri).await;
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    (status, json)
}

/// Parses an SSE body into `(event name, JSON data)` pairs.
pub fn sse_events(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_owned());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = Some(serde_json::from_str(value.trim()).unwrap());
                }
            }
            Some((name?, data?))
        })
        .collect()
}
