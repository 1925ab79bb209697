use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use gatepass_auth::RoleSet;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Verify the bearer session and attach the resolved principal.
///
/// The role set always comes from the resolved profile, never from the
/// token.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let service_no = state.services.sessions.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "session token rejected");
        ApiError::Unauthenticated
    })?;

    let resolved = state
        .services
        .users
        .resolve_principal(&service_no)
        .await?
        .ok_or_else(|| {
            tracing::info!(%service_no, "session for an identity no source knows");
            ApiError::Unauthenticated
        })?;

    req.extensions_mut()
        .insert(PrincipalContext::new(service_no, resolved));

    Ok(next.run(req).await)
}

/// Route guard: the principal needs at least one of the allowed roles.
///
/// Must run after [`auth_middleware`].
pub async fn require_any_role(
    State(allowed): State<RoleSet>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = current_principal(&req)?;
    authz::authorize(principal, &allowed)?;
    Ok(next.run(req).await)
}

/// Route guard: the principal must hold `SuperAdmin`; `Admin` is not enough.
pub async fn require_super_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let principal = current_principal(&req)?;
    authz::authorize_super_admin(principal)?;
    Ok(next.run(req).await)
}

fn current_principal(req: &Request) -> Result<&PrincipalContext, ApiError> {
    req.extensions()
        .get::<PrincipalContext>()
        .ok_or(ApiError::Unauthenticated)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ApiError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| ApiError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert!(extract_bearer(&headers("Basic abc")).is_err());
        assert!(extract_bearer(&headers("bearer abc")).is_err());
        assert!(extract_bearer(&headers("Bearer    ")).is_err());
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }
}
