use axum::{Json, extract::Extension, http::StatusCode};

use crate::app::dto::WhoAmIResponse;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        user: principal.profile().clone(),
        roles: principal.roles().clone(),
        source: principal.source(),
    })
}
