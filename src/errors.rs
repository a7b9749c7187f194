use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::payments::GatewayError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "code": "review_required",
    "message": "Review required: order must be reviewed before it can move to shipping",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Machine-readable error code
    #[schema(example = "review_required")]
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Extra context, such as the payload a payment gateway answered with
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Forbidden: {0}")]
    ForbiddenRole(String),

    #[error("Forbidden transition: {0}")]
    ForbiddenTransition(String),

    #[error("Review required: {0}")]
    ReviewRequired(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Concurrent modification of order {0}")]
    ConcurrentModification(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::ReviewRequired(_)
            | Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::ForbiddenRole(_) | Self::ForbiddenTransition(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::Gateway(err) => match err {
                // the order is still retryable
                GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                GatewayError::Unreachable(_)
                | GatewayError::Rejected { .. }
                | GatewayError::Malformed(_) => StatusCode::BAD_REQUEST,
            },
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code surfaced to clients alongside the status.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::ForbiddenRole(_) => "forbidden_role",
            Self::ForbiddenTransition(_) => "forbidden_transition",
            Self::ReviewRequired(_) => "review_required",
            Self::EmptyCart => "empty_cart",
            Self::Gateway(err) => err.code(),
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Unauthorized(_) => "unauthorized",
            Self::DatabaseError(_) => "database_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Gateway(GatewayError::Rejected { status, body }) => Some(json!({
                "gateway_status": status,
                "gateway_response": body,
            })),
            Self::Gateway(GatewayError::Malformed(reason))
            | Self::Gateway(GatewayError::Unreachable(reason)) => {
                Some(json!({ "reason": reason }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.error_code().to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
