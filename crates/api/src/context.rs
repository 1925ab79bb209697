use gatepass_auth::{ProfileView, RoleSet};
use gatepass_core::ServiceNo;
use gatepass_infra::{PrincipalSource, ResolvedPrincipal};

/// Principal context for a request (resolved profile + role set).
///
/// Inserted by the auth middleware after the session token is verified and
/// the service number is resolved; never built from token claims alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalContext {
    service_no: ServiceNo,
    profile: ProfileView,
    roles: RoleSet,
    source: PrincipalSource,
}

impl PrincipalContext {
    pub fn new(service_no: ServiceNo, resolved: ResolvedPrincipal) -> Self {
        Self {
            service_no,
            profile: resolved.profile,
            roles: resolved.roles,
            source: resolved.source,
        }
    }

    pub fn service_no(&self) -> &ServiceNo {
        &self.service_no
    }

    pub fn profile(&self) -> &ProfileView {
        &self.profile
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn source(&self) -> PrincipalSource {
        self.source
    }
}
