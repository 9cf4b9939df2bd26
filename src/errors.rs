use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

static ALERTS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Mark internal failures for out-of-band alerting (enabled outside development).
pub fn enable_alerts(enabled: bool) {
    ALERTS_ENABLED.store(enabled, Ordering::Relaxed);
}

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Failure body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Always null on failures
    pub data: Option<serde_json::Value>,
    /// Field-level problems for validation failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Validation failed")]
    InvalidFields(Vec<String>),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("{0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_field_errors("", &err, &mut fields);
        fields.sort();
        ServiceError::InvalidFields(fields)
    }
}

/// Flatten nested errors into `path: message` lines, e.g. `items[0].quantity: range`.
fn collect_field_errors(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                out.extend(list.iter().map(|e| match &e.message {
                    Some(message) => format!("{}: {}", path, message),
                    None => format!("{}: {}", path, e.code),
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::ExternalServiceError("payment provider timed out".to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidFields(_)
            | Self::InvalidInput(_)
            | Self::InvalidOperation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return a fixed message to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            return "Internal Server Error".to_string();
        }
        self.to_string()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();

        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                alert = ALERTS_ENABLED.load(Ordering::Relaxed),
                request_id = request_id.as_deref().unwrap_or("-"),
                error = %self,
                "request failed"
            );
        }

        let errors = match &self {
            Self::InvalidFields(fields) => Some(fields.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            data: None,
            errors,
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn or_not_found(self, message: &str) -> Result<T, ServiceError>;
}

impl<T> ResultExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T, ServiceError> {
        self.ok_or_else(|| ServiceError::NotFound(message.to_string()))
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
                ServiceError::NotFound("Coupon not found".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert!(!payload.success);
        assert!(payload.data.is_none());
        assert_eq!(payload.message, "Coupon not found");
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
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::PaymentFailed("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ServiceError::ExternalServiceError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_are_flattened() {
        assert_eq!(
            ServiceError::InternalError("pool exhausted".into()).response_message(),
            "Internal Server Error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).response_message(),
            "Internal Server Error"
        );
        assert_eq!(
            ServiceError::BadRequest("Coupon has expired".into()).response_message(),
            "Coupon has expired"
        );
    }

    #[tokio::test]
    async fn validation_failures_list_fields() {
        let response = ServiceError::InvalidFields(vec!["email: invalid".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.errors, Some(vec!["email: invalid".to_string()]));
        assert_eq!(payload.message, "Validation failed");
    }
}
