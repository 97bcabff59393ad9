//! Routes for the product registry.
//!
//! Commands are dispatched asynchronously: each POST publishes the command
//! under a fresh correlation id and redirects to the result stream for it.

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use product_registry::application::correlation_bridge::{BridgeItem, CorrelationBridge};
use product_registry::application::query_handlers::{self, ProductView, RegistryView};
use product_registry::domain::commands::{
    ProductRegistryCommand, RegisterProduct, RemoveProduct, UpdateProduct,
};
use product_registry::domain::product::ProductId;
use registry_core::correlation::CorrelationId;
use registry_core::error::DomainError;
use registry_core::transport::OutgoingCommand;
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Output buffer of one result stream.
const STREAM_CAPACITY: usize = 16;

/// Request body for POST /register.
#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    /// Identifier of the new product.
    pub product_id: String,
    /// Product name; must not be used by another live product.
    pub name: String,
    /// Product description.
    pub description: String,
}

/// Request body for POST /update.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    /// The product to update.
    pub product_id: String,
    /// New name.
    pub name: String,
    /// New description.
    pub description: String,
}

/// Request body for POST /remove.
#[derive(Debug, Deserialize)]
pub struct RemoveProductRequest {
    /// The product to remove.
    pub product_id: String,
}

/// Query string of GET /events.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Correlation id returned by a dispatch endpoint.
    pub correlation_id: Uuid,
}

/// Location of the result stream for `correlation_id`.
#[must_use]
pub fn events_location(correlation_id: CorrelationId) -> String {
    format!("/api/v1/products/events?correlation_id={correlation_id}")
}

async fn dispatch(
    state: &AppState,
    command: &ProductRegistryCommand,
) -> Result<Redirect, ApiError> {
    let correlation_id = CorrelationId::new();
    let payload = command
        .encode()
        .map_err(|e| DomainError::Infrastructure(format!("failed to encode command: {e}")))?;

    state
        .command_publisher
        .publish(OutgoingCommand::new(correlation_id, payload))
        .await?;

    info!(
        correlation_id = %correlation_id,
        product_id = %command.product_id(),
        "dispatched command"
    );
    Ok(Redirect::to(&events_location(correlation_id)))
}

/// POST /register
#[instrument(skip(state, request), fields(product_id = %request.product_id))]
async fn register_product(
    State(state): State<AppState>,
    Json(request): Json<RegisterProductRequest>,
) -> Result<Redirect, ApiError> {
    let command = ProductRegistryCommand::RegisterProduct(RegisterProduct {
        product_id: request.product_id.parse()?,
        name: request.name,
        description: request.description,
    });
    dispatch(&state, &command).await
}

/// POST /update
#[instrument(skip(state, request), fields(product_id = %request.product_id))]
async fn update_product(
    State(state): State<AppState>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Redirect, ApiError> {
    let command = ProductRegistryCommand::UpdateProduct(UpdateProduct {
        product_id: request.product_id.parse()?,
        name: request.name,
        description: request.description,
    });
    dispatch(&state, &command).await
}

/// POST /remove
#[instrument(skip(state, request), fields(product_id = %request.product_id))]
async fn remove_product(
    State(state): State<AppState>,
    Json(request): Json<RemoveProductRequest>,
) -> Result<Redirect, ApiError> {
    let command = ProductRegistryCommand::RemoveProduct(RemoveProduct {
        product_id: request.product_id.parse()?,
    });
    dispatch(&state, &command).await
}

fn to_sse(item: BridgeItem) -> Result<Event, axum::Error> {
    match item {
        Ok(view) => Event::default().event(&view.event_type).json_data(&view),
        Err(error) => Event::default().event("error").json_data(&error),
    }
}

/// GET /events?correlation_id=...
#[instrument(skip(state, query), fields(correlation_id = %query.correlation_id))]
async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let correlation_id = CorrelationId::from_uuid(query.correlation_id);
    let subscription = state.event_transport.subscribe(correlation_id).await?;

    let bridge = CorrelationBridge::new(state.quiet_timeout).on_error(move |err| {
        warn!(correlation_id = %correlation_id, error = %err, "result stream failed");
    });
    let (_bridge_task, items) = bridge.spawn(subscription, STREAM_CAPACITY);

    Ok(Sse::new(items.map(to_sse)).keep_alive(KeepAlive::default()))
}

/// GET /
#[instrument(skip(state))]
async fn get_registry(State(state): State<AppState>) -> Result<Json<RegistryView>, ApiError> {
    let view =
        query_handlers::get_registry(state.registry_id, state.event_repository.as_ref()).await?;
    Ok(Json(view))
}

/// GET /{product_id}
#[instrument(skip(state))]
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductView>, ApiError> {
    let product_id: ProductId = product_id.parse()?;
    let view = query_handlers::get_product(
        state.registry_id,
        &product_id,
        state.event_repository.as_ref(),
    )
    .await?;
    view.map(Json).ok_or(ApiError::ProductNotFound(product_id))
}

/// Returns the router for the product registry.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_registry))
        .route("/register", post(register_product))
        .route("/update", post(update_product))
        .route("/remove", post(remove_product))
        .route("/events", get(stream_events))
        .route("/{product_id}", get(get_product))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use product_registry::domain::aggregates::ProductRegistry;
    use product_registry::domain::messages::ChannelMessage;
    use registry_core::aggregate::AggregateRoot;
    use registry_core::clock::Clock;
    use registry_core::repository::EventRepository;
    use registry_core::transport::{CommandPublisher, EventTransport};
    use registry_test_support::{
        EmptyEventRepository, FailingCommandPublisher, FailingEventTransport, FixedClock,
        RecordingCommandPublisher, RecordingEventTransport, ScriptStep, ScriptedSubscription,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state_with(
        command_publisher: Arc<dyn CommandPublisher>,
        event_transport: Arc<dyn EventTransport>,
    ) -> AppState {
        let event_repository: Arc<dyn EventRepository> = Arc::new(EmptyEventRepository);
        AppState::new(
            Uuid::new_v4(),
            command_publisher,
            event_transport,
            event_repository,
            Duration::from_millis(50),
        )
    }

    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_register_publishes_command_and_redirects_to_its_stream() {
        // Arrange
        let publisher = Arc::new(RecordingCommandPublisher::new());
        let app = router().with_state(app_state_with(
            publisher.clone(),
            Arc::new(RecordingEventTransport::new()),
        ));
        let body = serde_json::json!({
            "product_id": "12345",
            "name": "Test Product",
            "description": "A product for testing."
        });

        // Act
        let response = app.oneshot(post("/register", &body)).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        let correlation_id = &published[0].properties["correlation-id"];
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(
            location,
            format!("/api/v1/products/events?correlation_id={correlation_id}")
        );
        let command = ProductRegistryCommand::decode(&published[0].payload).unwrap();
        assert_eq!(command.product_id().as_str(), "12345");
    }

    #[tokio::test]
    async fn test_each_dispatch_gets_a_fresh_correlation_id() {
        let publisher = Arc::new(RecordingCommandPublisher::new());
        let state = app_state_with(publisher.clone(), Arc::new(RecordingEventTransport::new()));
        let body = serde_json::json!({ "product_id": "12345" });

        router()
            .with_state(state.clone())
            .oneshot(post("/remove", &body))
            .await
            .unwrap();
        router()
            .with_state(state)
            .oneshot(post("/remove", &body))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_ne!(
            published[0].properties["correlation-id"],
            published[1].properties["correlation-id"]
        );
    }

    #[tokio::test]
    async fn test_blank_product_id_returns_400() {
        let publisher = Arc::new(RecordingCommandPublisher::new());
        let app = router().with_state(app_state_with(
            publisher.clone(),
            Arc::new(RecordingEventTransport::new()),
        ));
        let body = serde_json::json!({ "product_id": "  ", "name": "n", "description": "d" });

        let response = app.oneshot(post("/update", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new()),
        ));

        let response = app
            .oneshot(post("/register", &serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_publish_failure_returns_503() {
        let app = router().with_state(app_state_with(
            Arc::new(FailingCommandPublisher),
            Arc::new(RecordingEventTransport::new()),
        ));

        let response = app
            .oneshot(post("/remove", &serde_json::json!({ "product_id": "12345" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stream_returns_503_when_subscription_fails() {
        // Arrange
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(FailingEventTransport),
        ));
        let uri = format!("/events?correlation_id={}", Uuid::new_v4());
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "transport_error");
    }

    #[tokio::test]
    async fn test_stream_emits_named_events_and_ends_on_silence() {
        // Arrange
        let clock = FixedClock::default();
        let registry = ProductRegistry::new(Uuid::new_v4());
        let command = ProductRegistryCommand::RegisterProduct(RegisterProduct {
            product_id: "12345".parse().unwrap(),
            name: "Test Product".to_owned(),
            description: "A product for testing.".to_owned(),
        });
        let event = registry
            .handle(&command, CorrelationId::new(), &clock as &dyn Clock)
            .unwrap();
        let payload = ChannelMessage::ProductRegistryEvent(event).encode().unwrap();
        let subscription = ScriptedSubscription::new(vec![ScriptStep::Message(payload)]);
        let probe = subscription.probe();
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new().with_subscription(subscription)),
        ));
        let uri = format!("/events?correlation_id={}", Uuid::new_v4());
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let text = body_text(response).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("event: ProductRegistered"));
        assert!(text.contains("\"product_id\":\"12345\""));
        assert!(text.contains("\"version\":1"));
        assert_eq!(probe.acknowledged(), vec![1]);
        assert_eq!(probe.unsubscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_emits_rejection_as_error_event() {
        let error = product_registry::domain::errors::RegistryError {
            code: "duplicate_product_id".to_owned(),
            message: "product 12345 already exists".to_owned(),
        };
        let payload = ChannelMessage::ProductRegistryError(error).encode().unwrap();
        let subscription = ScriptedSubscription::new(vec![ScriptStep::Message(payload)]);
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new().with_subscription(subscription)),
        ));
        let uri = format!("/events?correlation_id={}", Uuid::new_v4());
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        let text = body_text(response).await;

        assert!(text.contains("event: error"));
        assert!(text.contains("\"code\":\"duplicate_product_id\""));
    }

    #[tokio::test]
    async fn test_stream_rejects_malformed_correlation_id() {
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new()),
        ));
        let request = Request::builder()
            .uri("/events?correlation_id=not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_registry_without_history_returns_404() {
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new()),
        ));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_unknown_product_returns_product_not_found() {
        let app = router().with_state(app_state_with(
            Arc::new(RecordingCommandPublisher::new()),
            Arc::new(RecordingEventTransport::new()),
        ));
        let request = Request::builder().uri("/12345").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "product_not_found");
    }
}
