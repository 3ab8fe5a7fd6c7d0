//! # Error Handling
//!
//! Unified error handling for gaekit handlers, rendering a consistent
//! problem+json response with trace ID propagation.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::session::SessionError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Trace ID of the active request, or a generated correlation ID outside one.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Access denied.")]
    Forbidden,
    #[error("Not Found")]
    NotFound,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::Forbidden => "FORBIDDEN",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "PROVIDER_ERROR",
        }
    }

    /// Build an [`ApiError`] of this type with a custom message
    pub fn with_message(&self, message: &str) -> ApiError {
        ApiError::new(self.status_code(), self.error_code(), message)
    }
}

/// Upstream identity provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Which provider call failed (e.g. "token_exchange", "userinfo")
    pub operation: String,
    /// HTTP status code from upstream, when one was received
    pub status: Option<u16>,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        error_type.with_message(&error_type.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        ErrorType::InternalServerError.with_message("An internal error occurred")
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        tracing::error!("Session backend error: {:?}", error);

        ErrorType::InternalServerError.with_message("Session storage unavailable")
    }
}

/// Create an identity provider upstream error (502)
pub fn provider_error(operation: &str, status: Option<u16>, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        operation: operation.to_string(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    let message = match status {
        Some(status) => format!("Identity provider {} returned status {}", operation, status),
        None => format!("Identity provider {} failed", operation),
    };

    ErrorType::BadGateway
        .with_message(&message)
        .with_details(json!(provider_error))
}

/// Create a bad request error (400)
pub fn bad_request(message: &str) -> ApiError {
    ErrorType::BadRequest.with_message(message)
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    match message {
        Some(message) => ErrorType::Unauthorized.with_message(message),
        None => ErrorType::Unauthorized.with_message("Authentication required"),
    }
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    match message {
        Some(message) => ErrorType::Forbidden.with_message(message),
        None => ErrorType::Forbidden.into(),
    }
}

/// Create a not found error (404)
pub fn not_found(message: &str) -> ApiError {
    ErrorType::NotFound.with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_error_type_mapping() {
        let not_found_error: ApiError = ErrorType::NotFound.into();
        assert_eq!(not_found_error.code, Box::from("NOT_FOUND"));
        assert_eq!(not_found_error.status, StatusCode::NOT_FOUND);

        let forbidden_error: ApiError = ErrorType::Forbidden.into();
        assert_eq!(forbidden_error.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden_error.message, Box::from("Access denied."));
    }

    #[test]
    fn test_from_anyhow() {
        let api_error: ApiError = anyhow::anyhow!("Something went wrong").into();

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_provider_error_always_maps_to_bad_gateway() {
        let error = provider_error("token_exchange", Some(401), Some("invalid_grant".into()));

        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.code, Box::from("PROVIDER_ERROR"));
        assert!(error.message.contains("token_exchange"));

        let details = error.details.unwrap();
        assert_eq!(details["operation"], "token_exchange");
        assert_eq!(details["status"], 401);
        assert_eq!(details["body_snippet"], "invalid_grant");
    }

    #[test]
    fn test_provider_error_truncates_body() {
        let long_body = "x".repeat(500);
        let error = provider_error("userinfo", None, Some(long_body));

        let details = error.details.unwrap();
        let snippet = details["body_snippet"].as_str().unwrap();
        assert_eq!(snippet.len(), 203);
        assert!(snippet.ends_with("..."));
        assert!(error.message.contains("failed"));
    }

    #[test]
    fn test_from_session_error() {
        let api_error: ApiError = SessionError::Backend("down".to_string()).into();
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_error.message.contains("down"));
    }

    #[test]
    fn test_content_type_header() {
        let response = bad_request("Test error").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_helpers_match_error_types() {
        for (error, error_type) in [
            (bad_request("bad"), ErrorType::BadRequest),
            (unauthorized(None), ErrorType::Unauthorized),
            (forbidden(Some("no")), ErrorType::Forbidden),
            (not_found("gone"), ErrorType::NotFound),
            (provider_error("userinfo", None, None), ErrorType::BadGateway),
        ] {
            assert_eq!(error.status, error_type.status_code());
            assert_eq!(&*error.code, error_type.error_code());
        }
    }

    #[test]
    fn test_helpers_status_codes() {
        assert_eq!(unauthorized(None).status, StatusCode::UNAUTHORIZED);
        assert_eq!(forbidden(None).status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden(None).message, Box::from("Access denied."));
        assert_eq!(not_found("gone").status, StatusCode::NOT_FOUND);
        assert_eq!(bad_request("bad").code, Box::from("VALIDATION_FAILED"));
    }

    #[test]
    fn test_trace_id_generation() {
        let error = bad_request("Test error");

        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }
}
