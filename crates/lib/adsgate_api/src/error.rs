//! Application error types and the JSON error envelope.

use std::any::Any;

use adsgate_core::ads::ForwardError;
use adsgate_core::auth::AuthError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Current time as an RFC 3339 string with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{error}: {details}")]
    Validation { error: String, details: String },

    /// Token resolution or the upstream call failed before a response arrived.
    #[error("{error}: {message}")]
    Upstream {
        error: &'static str,
        message: String,
        details: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Validation {
            error: error.into(),
            details: details.into(),
        }
    }

    /// Wrap an auth failure on a proxied route.
    pub fn from_auth(error: &'static str, e: AuthError) -> Self {
        Self::Upstream {
            error,
            message: e.to_string(),
            details: "authentication_error",
        }
    }

    /// Wrap a forwarding failure on a proxied route.
    pub fn from_forward(error: &'static str, e: ForwardError) -> Self {
        Self::Upstream {
            error,
            message: e.to_string(),
            details: "upstream_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            AppError::Validation { error, details } => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope {
                    error,
                    message: None,
                    details: Some(details),
                    timestamp: timestamp(),
                },
            ),
            AppError::Upstream {
                error,
                message,
                details,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope {
                    error: error.into(),
                    message: Some(message),
                    details: Some(details.into()),
                    timestamp: timestamp(),
                },
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorEnvelope {
                    error: "Not found".into(),
                    message: Some(message),
                    details: None,
                    timestamp: timestamp(),
                },
            ),
            AppError::RateLimited { retry_after_secs } => {
                let mut resp = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorEnvelope {
                        error: "Too many requests".into(),
                        message: Some(format!(
                            "Rate limit exceeded, retry in {retry_after_secs} seconds"
                        )),
                        details: None,
                        timestamp: timestamp(),
                    }),
                )
                    .into_response();
                resp.headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return resp;
            }
            AppError::PayloadTooLarge(message) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorEnvelope {
                    error: "Payload too large".into(),
                    message: Some(message),
                    details: None,
                    timestamp: timestamp(),
                },
            ),
            AppError::Internal(message) => {
                error!(%message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorEnvelope {
                        error: "Internal server error".into(),
                        message: Some(message),
                        details: None,
                        timestamp: timestamp(),
                    },
                )
            }
        };
        (status, Json(envelope)).into_response()
    }
}

/// Response for a handler that panicked.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unexpected failure".to_string()
    };
    AppError::Internal(message).into_response()
}
