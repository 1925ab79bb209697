//! User lookups. Profile, branch, and supervisor reads are public; listing
//! by role needs a session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::get,
};

use gatepass_auth::{Branch, ProfileView};
use gatepass_infra::directory::SupervisorView;

use crate::app::dto::{parse_role, parse_service_no};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn public_router() -> Router {
    Router::new()
        .route("/users/:service_no", get(get_user))
        .route("/users/branch/:branch", get(pleaders_by_branch))
        .route("/users/supervisors/:service_no", get(supervisors))
}

pub fn protected_router() -> Router {
    Router::new().route("/users/role/:role", get(users_by_role))
}

/// GET /users/:service_no
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw): Path<String>,
) -> Result<Json<ProfileView>, ApiError> {
    let service_no = parse_service_no(&raw)?;
    Ok(Json(services.users.profile_by_service_no(&service_no).await?))
}

/// GET /users/role/:role
pub async fn users_by_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<ProfileView>>, ApiError> {
    let role = parse_role(&raw)?;
    Ok(Json(services.users.by_role(role).await?))
}

/// GET /users/branch/:branch
pub async fn pleaders_by_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<ProfileView>>, ApiError> {
    let branch = Branch::parse(&raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(services.users.pleaders_by_branch(&branch).await?))
}

/// GET /users/supervisors/:service_no
pub async fn supervisors(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<SupervisorView>>, ApiError> {
    let service_no = parse_service_no(&raw)?;
    Ok(Json(services.users.supervisors(&service_no).await?))
}
