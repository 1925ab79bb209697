//! Admin routes for role management.
//!
//! Role grants need the `SuperAdmin` tag itself; listing accepts `Admin` or
//! `SuperAdmin`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use gatepass_auth::{ProfileView, Role, RoleSet};

use crate::app::dto::{GrantRolesBody, parse_role, parse_roles, parse_service_no};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    let grants = Router::new()
        .route("/users/:service_no/roles", post(grant_roles))
        .route_layer(from_fn(middleware::require_super_admin));

    let listing = Router::new()
        .route("/users/role/:role", get(users_by_role))
        .route_layer(from_fn_with_state(
            RoleSet::from([Role::Admin, Role::SuperAdmin]),
            middleware::require_any_role,
        ));

    grants.merge(listing)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/users/:service_no/roles - Union roles into a stored profile
pub async fn grant_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(raw): Path<String>,
    body: Result<Json<GrantRolesBody>, JsonRejection>,
) -> Result<Json<ProfileView>, ApiError> {
    let Json(body) = body?;
    let service_no = parse_service_no(&raw)?;
    let roles = parse_roles(&body.roles)?;

    let view = services.users.grant_roles(&service_no, roles.clone()).await?;
    tracing::info!(
        actor = %principal.service_no(),
        target = %service_no,
        granted = ?roles.to_vec(),
        "roles granted"
    );
    Ok(Json(view))
}

/// GET /admin/users/role/:role - List users holding a role
pub async fn users_by_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<ProfileView>>, ApiError> {
    let role = parse_role(&raw)?;
    Ok(Json(services.users.by_role(role).await?))
}
