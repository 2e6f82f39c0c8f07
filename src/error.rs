/*
 * Responsibility
 * - Application-wide AppError
 * - IntoResponse (HTTP status + JSON error body `{error:{code, message}}`)
 * - Map module errors (repo, cache, session, provider, config) into AppError
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::repos::error::RepoError;
use crate::services::session::SessionError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The identity provider round trip failed after the callback was accepted.
    #[error("Unable to grant access")]
    AccessNotGranted,

    #[error("internal server error")]
    Internal,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::AccessNotGranted | AppError::Internal | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Never leak configuration details to clients
            AppError::Config(_) => AppError::Internal.to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: status.as_u16(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => AppError::conflict("Duplicate user email or username"),
            RepoError::Db(err) => {
                error!(error = %err, "database error");
                AppError::Internal
            }
            RepoError::Corrupt(detail) => {
                error!(detail = %detail, "corrupt user record");
                AppError::Internal
            }
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        error!(error = %e, "session store error");
        AppError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_carries_numeric_status_and_message() {
        let res = AppError::forbidden("Unauthorized").into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": {"code": 403, "message": "Unauthorized"}})
        );
    }

    #[test]
    fn conflict_maps_to_409() {
        let err: AppError = RepoError::Conflict.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::Config(ConfigError::Missing("JWT_SIGN_ISSUER"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
