use crate::gateway::GatewayError;
use crate::grades::CellError;
use crate::local::LocalError;
use crate::session::{ChangePasswordError, PasswordError};
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Stable codes clients can match on; messages may be reworded.
pub mod error_code {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// The route does not exist in the configured storage mode.
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] GatewayError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        AppError::Internal(e.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => error_code::VALIDATION_FAILED,
            AppError::Unauthorized(_) => error_code::UNAUTHENTICATED,
            AppError::Forbidden(_) => error_code::PERMISSION_DENIED,
            AppError::NotFound(_) => error_code::NOT_FOUND,
            AppError::Conflict(_) => error_code::ALREADY_EXISTS,
            AppError::Unavailable(_) => error_code::UNAVAILABLE,
            AppError::Backend(_) => error_code::BACKEND_ERROR,
            AppError::Internal(_) => error_code::INTERNAL,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::NOT_FOUND,
            AppError::Backend(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }
        let body = serde_json::json!({
            "code": self.code(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<LocalError> for AppError {
    fn from(e: LocalError) -> Self {
        match e {
            LocalError::DuplicateEmail => AppError::Conflict(e.to_string()),
            LocalError::Invalid(msg) => AppError::Validation(msg),
            other => AppError::internal(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Gateway(g) => AppError::Backend(g),
            StoreError::Local(l) => l.into(),
            StoreError::NotConfigured => AppError::Unavailable(e.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(e: PasswordError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<ChangePasswordError> for AppError {
    fn from(e: ChangePasswordError) -> Self {
        match e {
            ChangePasswordError::Invalid(p) => p.into(),
            ChangePasswordError::Backend(g) => g.into(),
        }
    }
}

impl From<CellError> for AppError {
    fn from(e: CellError) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_mapping() {
        let e = AppError::from(LocalError::DuplicateEmail);
        assert_eq!(e.status(), StatusCode::CONFLICT);
        assert_eq!(e.code(), error_code::ALREADY_EXISTS);

        let e = AppError::from(StoreError::Gateway(GatewayError::new("boom")));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.to_string(), "boom");

        let e = AppError::from(ChangePasswordError::Invalid(PasswordError::Mismatch));
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn body_carries_code_and_message() {
        let resp = AppError::Forbidden("Non autorisé.".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["code"], "PERMISSION_DENIED");
        assert_eq!(v["error"], "Non autorisé.");
    }
}
