//! HTTP-facing error handling.
//!
//! Payment errors are wrapped in `AppError`, which carries the request id
//! and renders the standard JSON error body.

use crate::payments::error::PaymentError;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes returned to clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "CHANNEL_NOT_SUPPORTED")]
    ChannelNotSupported,
    #[serde(rename = "PAYMENT_REQUIRED")]
    PaymentRequired,
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl From<&PaymentError> for ErrorCode {
    fn from(error: &PaymentError) -> Self {
        match error {
            PaymentError::ValidationError { .. } => ErrorCode::ValidationError,
            PaymentError::StrategyNotFound { .. } => ErrorCode::ChannelNotSupported,
            PaymentError::PaymentRequired { .. } => ErrorCode::PaymentRequired,
            PaymentError::ProviderError { .. } => ErrorCode::PaymentProviderError,
            PaymentError::NetworkError { .. } => ErrorCode::ExternalServiceTimeout,
            PaymentError::NotFound { .. } => ErrorCode::NotFound,
            PaymentError::ConfigurationError { .. } => ErrorCode::ConfigurationError,
            PaymentError::InternalError { .. } => ErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub error: PaymentError,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn new(error: PaymentError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach the id set by the request-id layer, if any.
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.request_id = request_id_from_headers(headers);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.error.http_status_code()
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(&self.error)
    }

    pub fn user_message(&self) -> String {
        self.error.user_message()
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AppError {}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        Self::new(error)
    }
}

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// RFC 3339
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        let details = match &error.error {
            PaymentError::ValidationError {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details,
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn internal_error(request_id: Option<String>) -> Self {
        Self {
            error: ErrorCode::InternalError,
            message: "An internal server error occurred. Please try again later.".to_string(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable: Some(false),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self.error,
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self.error,
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

pub fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
