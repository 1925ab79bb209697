use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use gatepass_auth::AuthzError;
use gatepass_infra::{AuthError, UserQueryError};

/// Every way a request can fail, mapped onto one JSON error body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired, or unresolvable session.
    #[error("authentication required")]
    Unauthenticated,

    /// Same body for unknown user, wrong password, and upstream refusal.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is not configured")]
    Misconfigured(&'static str),

    /// Logged with full detail; the client sees a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Unauthenticated => json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required"),
            ApiError::InvalidCredentials => {
                json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "Invalid credentials")
            }
            ApiError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::AlreadyExists(detail) => {
                tracing::info!(%detail, "duplicate user rejected");
                json_error(StatusCode::BAD_REQUEST, "already_exists", "User already exists")
            }
            ApiError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Misconfigured(what) => json_error(
                StatusCode::NOT_IMPLEMENTED,
                "not_configured",
                format!("{what} is not configured on this server"),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::AlreadyExists(detail) => ApiError::AlreadyExists(detail),
            AuthError::NotFound => ApiError::NotFound("user not found".into()),
            AuthError::Misconfigured(what) => ApiError::Misconfigured(what),
            AuthError::BadRequest(msg) => ApiError::BadRequest(msg),
            AuthError::UpstreamUnavailable(detail) => ApiError::Internal(format!("upstream unavailable: {detail}")),
            AuthError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<UserQueryError> for ApiError {
    fn from(value: UserQueryError) -> Self {
        match value {
            UserQueryError::NotFound => ApiError::NotFound("user not found".into()),
            UserQueryError::BadRequest(msg) => ApiError::BadRequest(msg),
            UserQueryError::UpstreamUnavailable(detail) => {
                ApiError::Internal(format!("upstream unavailable: {detail}"))
            }
            UserQueryError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
