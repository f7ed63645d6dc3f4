//! Error types and Axum response conversions.

use crate::auth::protocol::AuthError;
use crate::auth::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Body text for every rejected login. The specific reason is only logged.
pub const AUTH_FAILED: &str = "Authentication failed";

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A login attempt was rejected. Rendered identically whatever the reason.
    #[error("Authentication failed")]
    AuthenticationFailed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthenticationFailed => (
                StatusCode::UNAUTHORIZED,
                json!({ "ok": false, "error": AUTH_FAILED }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Backend failures render as a failed login too
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Login aborted by internal error");
                AppError::AuthenticationFailed
            }
            _ => AppError::AuthenticationFailed,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Internal(format!("Session store error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::message::MessageError;
    use axum::http::StatusCode;

    /// Extract status code and JSON body from an AppError response.
    async fn error_response(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        // Internal error must NOT leak detailed message to client
        let (status, body) = error_response(AppError::Internal(
            "Redis connection refused at 10.0.0.5:6379".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(!body["error"].as_str().unwrap().contains("Redis"));
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_bad_request() {
        let (status, body) =
            error_response(AppError::BadRequest("Invalid format".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid format");
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let (status, body) =
            error_response(AppError::Unauthorized("Invalid or expired session".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired session");
    }

    #[tokio::test]
    async fn test_every_auth_error_renders_the_same() {
        let errors = vec![
            AuthError::NonceInvalid,
            AuthError::MessageInvalid(MessageError::NonceMismatch),
            AuthError::MessageInvalid(MessageError::DomainMismatch {
                expected: "a.example".to_string(),
                found: "b.example".to_string(),
            }),
            AuthError::SignatureInvalid("recovered address does not match".to_string()),
            AuthError::Timeout,
            AuthError::Internal("redis down".to_string()),
        ];

        for err in errors {
            let (status, body) = error_response(AppError::from(err)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, json!({ "ok": false, "error": "Authentication failed" }));
        }
    }

    #[test]
    fn test_from_session_error() {
        let app_err = AppError::from(SessionError::Backend("connection refused".to_string()));
        match app_err {
            AppError::Internal(msg) => assert!(msg.contains("Session store error")),
            _ => panic!("Expected Internal variant"),
        }
    }
}
