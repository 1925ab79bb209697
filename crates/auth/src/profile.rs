//! The unified identity record and its field-level merge.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_core::{DomainError, ProfileId, ServiceNo, UserType};

use crate::{Role, RoleSet};

/// Branch (site) affiliation, e.g. the premises a pleader serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Branch(String);

impl Branch {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("branch name is empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Branch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Branch {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Branch> for String {
    fn from(value: Branch) -> Self {
        value.0
    }
}

/// A user known to the local identity store.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: ProfileId,
    pub user_type: UserType,
    pub user_id: String,
    pub service_no: ServiceNo,
    /// PHC string. For directory/federated users this is the hash of a
    /// random password nobody knows.
    pub password_hash: String,

    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub group: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,

    pub roles: RoleSet,
    pub branches: BTreeSet<Branch>,

    pub is_api_user: bool,
    pub is_azure_user: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Raw directory fields, kept for audit and display only.
    pub directory_snapshot: Option<serde_json::Value>,
    pub supervisor_service_no: Option<ServiceNo>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// A bare profile with no descriptive fields and no roles.
    ///
    /// Callers fill the rest with [`UserProfile::apply`].
    pub fn new(
        user_id: impl Into<String>,
        user_type: UserType,
        service_no: ServiceNo,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProfileId::new(),
            user_type,
            user_id: user_id.into(),
            service_no,
            password_hash,
            name: None,
            designation: None,
            section: None,
            group: None,
            contact_no: None,
            email: None,
            roles: RoleSet::new(),
            branches: BTreeSet::new(),
            is_api_user: false,
            is_azure_user: false,
            last_synced_at: None,
            directory_snapshot: None,
            supervisor_service_no: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update into this profile.
    ///
    /// Precedence, per field:
    /// - descriptive fields, provenance flags, sync metadata: a present value
    ///   in `update` wins, an absent one leaves the stored value;
    /// - roles: unioned, never replaced or removed;
    /// - `service_no`, `user_id`, `user_type`, `password_hash`, `branches`:
    ///   untouched.
    pub fn apply(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut self.name, update.name);
        set(&mut self.designation, update.designation);
        set(&mut self.section, update.section);
        set(&mut self.group, update.group);
        set(&mut self.contact_no, update.contact_no);
        set(&mut self.email, update.email);
        set(&mut self.last_synced_at, update.last_synced_at);
        set(&mut self.directory_snapshot, update.directory_snapshot);
        set(&mut self.supervisor_service_no, update.supervisor_service_no);

        if let Some(flag) = update.is_api_user {
            self.is_api_user = flag;
        }
        if let Some(flag) = update.is_azure_user {
            self.is_azure_user = flag;
        }

        self.roles.union_with(&update.add_roles);
        self.updated_at = now;
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    pub fn view(&self) -> ProfileView {
        ProfileView {
            id: Some(self.id),
            user_type: self.user_type.clone(),
            user_id: self.user_id.clone(),
            service_no: self.service_no.clone(),
            name: self.name.clone(),
            designation: self.designation.clone(),
            section: self.section.clone(),
            group: self.group.clone(),
            contact_no: self.contact_no.clone(),
            email: self.email.clone(),
            role: self.roles.or_default_user().primary().unwrap_or(Role::User),
            roles: self.roles.clone(),
            branches: self.branches.iter().cloned().collect(),
            is_api_user: self.is_api_user,
            is_azure_user: self.is_azure_user,
            last_synced_at: self.last_synced_at,
            supervisor_service_no: self.supervisor_service_no.clone(),
            directory_data: self.directory_snapshot.clone(),
        }
    }
}

/// Partial update applied by [`UserProfile::apply`]. `None` means "leave as
/// is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub group: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,
    pub is_api_user: Option<bool>,
    pub is_azure_user: Option<bool>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub directory_snapshot: Option<serde_json::Value>,
    pub supervisor_service_no: Option<ServiceNo>,
    /// Roles to add. Never removes.
    pub add_roles: RoleSet,
}

impl ProfileUpdate {
    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.add_roles.union_with(&roles);
        self
    }

    pub fn synced_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_synced_at = Some(at);
        self
    }

    pub fn api_user(mut self) -> Self {
        self.is_api_user = Some(true);
        self
    }

    pub fn azure_user(mut self) -> Self {
        self.is_azure_user = Some(true);
        self
    }
}

/// Outward-facing profile shape. Never carries the credential hash.
///
/// `id` is absent for read-through directory profiles that were never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ProfileId>,
    pub user_type: UserType,
    pub user_id: String,
    pub service_no: ServiceNo,
    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub group: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,
    /// Primary role, for clients that display a single one.
    pub role: Role,
    pub roles: RoleSet,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub is_api_user: bool,
    #[serde(default)]
    pub is_azure_user: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub supervisor_service_no: Option<ServiceNo>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub directory_data: Option<serde_json::Value>,
}

impl ProfileView {
    /// View of a profile that exists only in the directory.
    pub fn unstored(service_no: ServiceNo, update: ProfileUpdate) -> Self {
        let roles = update.add_roles.or_default_user();
        Self {
            id: None,
            user_type: UserType::default(),
            user_id: service_no.to_string(),
            service_no,
            name: update.name,
            designation: update.designation,
            section: update.section,
            group: update.group,
            contact_no: update.contact_no,
            email: update.email,
            role: roles.primary().unwrap_or(Role::User),
            roles,
            branches: Vec::new(),
            is_api_user: update.is_api_user.unwrap_or(false),
            is_azure_user: update.is_azure_user.unwrap_or(false),
            last_synced_at: update.last_synced_at,
            supervisor_service_no: update.supervisor_service_no,
            directory_data: update.directory_snapshot,
        }
    }
}
