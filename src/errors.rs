use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::order::OrderStatus;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Invalid operation: only pending orders can be cancelled",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Not found: order not found")]
    pub message: String,
    /// Field level validation details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
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
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Database errors return a generic message.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// Failures of the order aggregate and the payment-proof workflow.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("failed to get cart: {0}")]
    CartUnavailable(String),

    #[error("order not found")]
    OrderNotFound,

    #[error("cannot move order from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unknown order status '{0}'")]
    UnknownStatus(String),

    #[error("order has been cancelled")]
    OrderCancelled,

    #[error("payment already confirmed for this order")]
    AlreadyPaid,

    #[error("a payment proof is already awaiting review for this order")]
    ProofAlreadyPending,

    #[error("payment proof not found")]
    ProofNotFound,

    #[error("payment proof has already been reviewed")]
    ProofAlreadyReviewed,

    #[error("Status must be 'approved' or 'rejected', got '{0}'")]
    InvalidReviewDecision(String),

    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::OrderNotFound | OrderError::ProofNotFound => {
                ServiceError::NotFound(err.to_string())
            }
            OrderError::UnknownStatus(_) | OrderError::InvalidReviewDecision(_) => {
                ServiceError::InvalidStatus(err.to_string())
            }
            OrderError::EmptyCart
            | OrderError::InvalidTransition { .. }
            | OrderError::OrderCancelled
            | OrderError::AlreadyPaid
            | OrderError::ProofAlreadyPending
            | OrderError::ProofAlreadyReviewed => ServiceError::InvalidOperation(err.to_string()),
            OrderError::CartUnavailable(_) => ServiceError::ServiceUnavailable(err.to_string()),
            OrderError::Database(db) => ServiceError::DatabaseError(db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.error, "Not Found");
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidOperation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn service_error_response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("relation missing".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("order not found".into()).response_message(),
            "Not found: order not found"
        );
    }

    #[test]
    fn order_errors_map_onto_http_taxonomy() {
        let cases = [
            (OrderError::EmptyCart, StatusCode::BAD_REQUEST),
            (OrderError::OrderNotFound, StatusCode::NOT_FOUND),
            (OrderError::ProofNotFound, StatusCode::NOT_FOUND),
            (OrderError::OrderCancelled, StatusCode::BAD_REQUEST),
            (OrderError::AlreadyPaid, StatusCode::BAD_REQUEST),
            (OrderError::ProofAlreadyPending, StatusCode::BAD_REQUEST),
            (OrderError::ProofAlreadyReviewed, StatusCode::BAD_REQUEST),
            (
                OrderError::InvalidTransition {
                    from: OrderStatus::Shipped,
                    to: OrderStatus::Cancelled,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                OrderError::InvalidReviewDecision("maybe".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                OrderError::CartUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                OrderError::Database(DbErr::Custom("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ServiceError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "cannot move order from 'delivered' to 'cancelled'"
        );
    }
}
