//! `gatepass-auth`: pure identity and authorization vocabulary.
//!
//! No network or storage I/O lives here: roles, role derivation, the user
//! profile and its merge rules, session tokens, password hashing, and
//! role-set checks.

pub mod authorize;
pub mod claims;
pub mod derive;
pub mod password;
pub mod principal;
pub mod profile;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, RoleRequirement, authorize_roles, require_super_admin};
pub use claims::{SessionClaims, TokenError, validate_claims};
pub use derive::{APPROVER_GRADES, derive_role};
pub use password::{PasswordError, PasswordHasher};
pub use principal::{FederatedIdentity, extract_service_no};
pub use profile::{Branch, ProfileUpdate, ProfileView, UserProfile};
pub use roles::{Role, RoleSet};
pub use session::{DEFAULT_SESSION_VALIDITY_DAYS, SessionIssuer};
