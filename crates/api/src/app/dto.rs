use serde::{Deserialize, Serialize};

use gatepass_auth::{ProfileView, Role, RoleSet};
use gatepass_core::{ServiceNo, UserType};
use gatepass_infra::{AuthOutcome, LoginRequest, PrincipalSource, Registration};

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub user_id: String,
    #[serde(default)]
    pub user_type: Option<String>,
    pub password: String,
}

impl LoginBody {
    pub fn into_request(self) -> LoginRequest {
        LoginRequest {
            user_id: self.user_id,
            user_type: non_blank(self.user_type).map(UserType::new),
            password: self.password,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(default)]
    pub user_type: Option<String>,
    pub user_id: String,
    pub password: String,
    pub service_no: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub contact_no: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Single role, as older clients send it.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub branches: Vec<String>,
}

impl RegisterBody {
    pub fn into_registration(self) -> Result<Registration, ApiError> {
        let roles = parse_roles(self.role.iter().chain(self.roles.iter()))?;
        Ok(Registration {
            user_type: non_blank(self.user_type).map(UserType::new),
            user_id: self.user_id,
            password: self.password,
            service_no: self.service_no,
            name: self.name,
            designation: self.designation,
            section: self.section,
            group: self.group,
            contact_no: self.contact_no,
            email: self.email,
            roles,
            branches: self.branches,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginBody {
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantRolesBody {
    pub roles: Vec<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    /// Primary role, for clients that read a single value.
    pub role: Role,
    pub roles: RoleSet,
    pub user: ProfileView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token_expires_in: Option<serde_json::Value>,
}

impl From<AuthOutcome> for LoginResponse {
    fn from(outcome: AuthOutcome) -> Self {
        let mut user = outcome.profile.view();
        // Federated clients know themselves by principal name.
        if let Some(principal_name) = outcome.principal_name {
            user.user_id = principal_name;
        }
        user.directory_data = None;

        let (api_token, api_token_expires_in) = match outcome.directory_session {
            Some(session) => (Some(session.token), session.expires_in),
            None => (None, None),
        };

        Self {
            token: outcome.token,
            role: outcome.roles.primary().unwrap_or(Role::User),
            roles: outcome.roles,
            user,
            api_token,
            api_token_expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationUrlResponse {
    pub auth_url: String,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user: ProfileView,
    pub roles: RoleSet,
    pub source: PrincipalSource,
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.trim().parse::<Role>().map_err(|_| {
        let known = Role::ALL.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ");
        ApiError::BadRequest(format!("unknown role '{raw}'; expected one of: {known}"))
    })
}

pub fn parse_roles<'a>(raw: impl IntoIterator<Item = &'a String>) -> Result<RoleSet, ApiError> {
    raw.into_iter().map(|r| parse_role(r)).collect()
}

pub fn parse_service_no(raw: &str) -> Result<ServiceNo, ApiError> {
    ServiceNo::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
