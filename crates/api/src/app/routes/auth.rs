//! Authentication routes: registration, password login, federated login.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use gatepass_infra::azure_login_url;

use crate::app::dto::{FederatedLoginBody, FederationUrlResponse, LoginBody, LoginResponse, RegisterBody};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/azure", post(federated_login))
        .route("/azure/url", get(federation_url))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let Json(body) = body?;
    let outcome = services.reconciler.register(body.into_registration()?).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(body) = body?;
    let outcome = services.reconciler.login(body.into_request()).await?;
    Ok(Json(outcome.into()))
}

/// POST /auth/azure
pub async fn federated_login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<FederatedLoginBody>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(body) = body?;
    let outcome = services.reconciler.federated_login(&body.access_token).await?;
    Ok(Json(outcome.into()))
}

/// GET /auth/azure/url
pub async fn federation_url(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<Json<FederationUrlResponse>, ApiError> {
    let azure = services
        .azure
        .as_ref()
        .ok_or(ApiError::Misconfigured("Azure login"))?;
    let url = azure_login_url(azure).map_err(|e| ApiError::Internal(format!("failed to build login URL: {e}")))?;
    Ok(Json(FederationUrlResponse { auth_url: url.into() }))
}
