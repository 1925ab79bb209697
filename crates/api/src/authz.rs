//! API-side role checks.
//!
//! Handlers and route guards call these with the request's
//! [`PrincipalContext`]; the decision itself lives in `gatepass-auth`.

use gatepass_auth::{AuthzError, RoleRequirement, authorize_roles, require_super_admin};

use crate::context::PrincipalContext;

/// Any overlap between the principal's roles and the requirement grants
/// access.
pub fn authorize<R: RoleRequirement + ?Sized>(principal: &PrincipalContext, requirement: &R) -> Result<(), AuthzError> {
    authorize_roles(principal.roles(), &requirement.allowed_roles())
}

/// Exactly `SuperAdmin`, no other role.
pub fn authorize_super_admin(principal: &PrincipalContext) -> Result<(), AuthzError> {
    require_super_admin(principal.roles())
}
