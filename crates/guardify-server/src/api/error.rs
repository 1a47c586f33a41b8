//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardify_core::GuardifyError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - The platform refused a permission.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource (or the tag) does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation does not fit the current session state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 502 Bad Gateway - The tag failed to connect or respond.
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - Bluetooth is unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "peripheral_not_found",
    "message": "No 'Guardify' tag found within 15 seconds. Ensure the tag is powered on and within range.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "object_not_found").
    #[schema(example = "object_not_found")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Object not found: '01936f4e-7c2a-7d4b-9a3e-5f1c2b3d4e5f'")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let plain = |status, error: String, message| {
            (
                status,
                ErrorResponse {
                    error,
                    message,
                    details: None,
                },
            )
        };

        let (status, error_response) = match self {
            Self::BadRequest {
                error_code,
                message,
            } => plain(StatusCode::BAD_REQUEST, error_code, message),
            Self::Forbidden {
                error_code,
                message,
            } => plain(StatusCode::FORBIDDEN, error_code, message),
            Self::NotFound {
                error_code,
                message,
            } => plain(StatusCode::NOT_FOUND, error_code, message),
            Self::Conflict {
                error_code,
                message,
            } => plain(StatusCode::CONFLICT, error_code, message),
            Self::BadGateway {
                error_code,
                message,
            } => plain(StatusCode::BAD_GATEWAY, error_code, message),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Forbidden { message, .. } => write!(f, "Forbidden: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::BadGateway { message, .. } => write!(f, "Bad Gateway: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from guardify-core errors, keyed on the core status code.
impl From<GuardifyError> for ApiError {
    fn from(err: GuardifyError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            403 => Self::Forbidden {
                error_code,
                message,
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            502 => Self::BadGateway {
                error_code,
                message,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<guardify_core::ObjectError> for ApiError {
    fn from(err: guardify_core::ObjectError) -> Self {
        Self::from(GuardifyError::from(err))
    }
}

impl From<guardify_core::CommandError> for ApiError {
    fn from(err: guardify_core::CommandError) -> Self {
        Self::from(GuardifyError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_from_core_error_uses_status_code() {
        let err = ApiError::from(GuardifyError::ObjectNotFound("abc".into()));
        assert!(matches!(
            err,
            ApiError::NotFound { ref error_code, .. } if error_code == "object_not_found"
        ));

        let err = ApiError::from(GuardifyError::PeripheralNotDiscovered);
        assert!(matches!(err, ApiError::Conflict { .. }));

        let err = ApiError::from(GuardifyError::ConfigValidationError("x".into()));
        assert!(matches!(err, ApiError::InternalError { .. }));
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::from(GuardifyError::BluetoothPermissionDenied).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError::from(GuardifyError::CommandFailed("gatt".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }
}
