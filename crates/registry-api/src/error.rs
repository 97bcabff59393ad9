//! Product registry API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use product_registry::domain::product::ProductId;
use registry_core::error::{DomainError, TransportError};
use serde::Serialize;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The tracing pipeline could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The command transport could not be wired up.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure from the domain or persistence layer.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The command or event transport refused the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The requested product is not live in the registry.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::Domain(DomainError::AggregateNotFound(_)) => {
                (StatusCode::NOT_FOUND, "aggregate_not_found")
            }
            Self::Domain(DomainError::ConcurrencyConflict { .. }) => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            Self::Domain(DomainError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            Self::Domain(DomainError::Infrastructure(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
            Self::Transport(_) => (StatusCode::SERVICE_UNAVAILABLE, "transport_error"),
            Self::ProductNotFound(_) => (StatusCode::NOT_FOUND, "product_not_found"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
