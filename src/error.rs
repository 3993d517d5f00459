//! Error types
//!
//! View negotiation itself never fails. These errors cover the collaborators
//! around it: configuration loading and the session store. The middleware
//! logs store errors and carries on with the request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by configuration and session storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MobileViewError {
    /// A configuration value could not be parsed
    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig {
        /// Configuration key (environment variable or field name)
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The session backing store failed
    #[error("Session store error: {0}")]
    SessionStore(String),
}

/// Result type for fallible mobile-view operations
pub type Result<T> = std::result::Result<T, MobileViewError>;

impl MobileViewError {
    /// Shorthand for [`MobileViewError::InvalidConfig`]
    pub fn invalid_config<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::SessionStore(_) => "SESSION_STORE",
        }
    }
}

/// Error body returned by the view endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Stable error code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for MobileViewError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store internals stay in the logs
        let message = match &self {
            Self::SessionStore(_) => "Session storage unavailable".to_string(),
            Self::InvalidConfig { .. } => "Internal server error".to_string(),
        };

        let body = ErrorResponse {
            code: self.error_code(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            MobileViewError::SessionStore("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            MobileViewError::invalid_config("MOBILE_VIEW_SESSION_TTL", "not a number")
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let err = MobileViewError::invalid_config("MOBILE_VIEW_FORCE_MOBILE", "expected bool");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for MOBILE_VIEW_FORCE_MOBILE: expected bool"
        );
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_into_response_hides_store_details() {
        let response = MobileViewError::SessionStore("redis: connection refused".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
