use thiserror::Error;

use crate::{Role, RoleSet};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: requires one of [{0}]")]
    Forbidden(String),

    #[error("forbidden: requires SuperAdmin")]
    SuperAdminRequired,
}

/// Route-level authorization contract.
///
/// Implemented by whatever declares an endpoint's allowed roles; the API
/// layer checks it before the handler runs.
pub trait RoleRequirement {
    fn allowed_roles(&self) -> RoleSet;
}

impl RoleRequirement for RoleSet {
    fn allowed_roles(&self) -> RoleSet {
        self.clone()
    }
}

/// Grant when `held` shares at least one role with `allowed`.
///
/// - No IO
/// - No panics
/// - An empty `allowed` set admits nobody
pub fn authorize_roles(held: &RoleSet, allowed: &RoleSet) -> Result<(), AuthzError> {
    if held.intersects(allowed) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(describe(allowed)))
    }
}

/// Stricter guard: the principal must hold `SuperAdmin` itself.
///
/// No widened allowed set applies here; `Admin` alone does not pass.
/// Roles picked up alongside (federation-derived or granted) do not revoke
/// the tag.
pub fn require_super_admin(held: &RoleSet) -> Result<(), AuthzError> {
    if held.contains(Role::SuperAdmin) {
        Ok(())
    } else {
        Err(AuthzError::SuperAdminRequired)
    }
}

fn describe(roles: &RoleSet) -> String {
    roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}
