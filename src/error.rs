//! Error types for the certificate core and their HTTP mapping.
//!
//! Validation and authorization problems are reported with enough detail to
//! fix the request. Rendering, storage and persistence failures are logged in
//! full and surface as a generic internal error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::RenderError;
use crate::db::StoreError;
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CertError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("authentication required")]
    Unauthenticated,

    /// Caller has no rights over the institution or certificate. Returned for
    /// missing certificates too, so it never confirms existence.
    #[error("forbidden")]
    Forbidden,

    /// Uniform for malformed and unknown ids.
    #[error("not found")]
    NotFound,

    /// The certificate kept changing underneath an update.
    #[error("conflicting concurrent update")]
    Conflict,

    #[error("rendering failed: {0}")]
    Rendering(#[from] RenderError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CertError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        CertError::Validation(vec![FieldError::new(field, message)])
    }
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    Forbidden,
    InvalidRequestBody,
    ValidationFailed,
    PayloadTooLarge,
    NotFound,
    Conflict,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code.as_str();
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            axum::http::header::HeaderName::from_static("x-error-code"),
            axum::http::HeaderValue::from_static(code),
        );
        response
    }
}

impl From<CertError> for ApiError {
    fn from(err: CertError) -> Self {
        match err {
            CertError::Validation(fields) => {
                ApiError::new(ErrorCode::ValidationFailed, "Request validation failed")
                    .with_details(serde_json::json!({ "fields": fields }))
            }
            CertError::Unauthenticated => {
                ApiError::new(ErrorCode::AuthRequired, "Caller identity is missing or invalid")
            }
            CertError::Forbidden => ApiError::new(
                ErrorCode::Forbidden,
                "Not permitted for this institution or certificate",
            ),
            CertError::NotFound => ApiError::new(ErrorCode::NotFound, "Certificate not found"),
            CertError::Conflict => ApiError::new(
                ErrorCode::Conflict,
                "Certificate was modified concurrently, retry the request",
            ),
            other => {
                tracing::error!("Request failed: {}", other);
                ApiError::new(ErrorCode::InternalError, "Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_fields() {
        let api: ApiError = CertError::invalid("expiry_date", "must not be before issue_date").into();
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let details = api.error.details.unwrap();
        assert_eq!(details["fields"][0]["field"], "expiry_date");
    }

    #[test]
    fn internal_failures_hide_detail() {
        let api: ApiError = CertError::Internal("connection reset by peer at 10.0.0.3".into()).into();
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.error.message, "Internal server error");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn not_found_is_404() {
        let api: ApiError = CertError::NotFound.into();
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(&api).unwrap()["error"]["code"],
            "NOT_FOUND"
        );
    }

    #[test]
    fn conflict_is_409() {
        let api: ApiError = CertError::Conflict.into();
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(
            serde_json::to_value(&api).unwrap()["error"]["code"],
            "CONFLICT"
        );
    }
}
