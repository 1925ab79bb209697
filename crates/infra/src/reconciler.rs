//! Authentication reconciler.
//!
//! Turns a login attempt into a session token and a role set, deciding which
//! identity source to trust and whether to create or refresh the local
//! profile. The local store always wins when it knows the user; the
//! directory and the identity provider are consulted only as the flows below
//! require.
//!
//! ## Flows
//!
//! - **Password login**: local profile first (password checked against the
//!   stored hash, then an optional directory refresh). Unknown users are
//!   authenticated by the directory and provisioned locally, but only while
//!   the directory is enabled.
//! - **Federated login**: the identity provider names the caller; the
//!   service number parsed from the principal name (or the principal name
//!   itself) is the join key. Directory-derived roles are unioned in.
//! - **Registration**: direct creation from the supplied fields.
//!
//! ## First-contact race
//!
//! The store rejects a second profile with the same `user_id` or
//! `service_no`. The losing request re-runs its "profile already exists"
//! branch once against the winner's profile. A directory login only adopts a
//! winner that the same directory login would have provisioned.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use gatepass_auth::{
    Branch, FederatedIdentity, PasswordError, PasswordHasher, ProfileUpdate, Role, RoleSet, SessionIssuer,
    TokenError, UserProfile,
};
use gatepass_core::{Clock, ServiceNo, UserType};
use thiserror::Error;

use crate::directory::{DirectoryGateway, DirectoryProfile, DirectorySession, DirectoryUser, map_record};
use crate::graph::{GraphError, IdentityProvider};
use crate::store::{StoreError, UserStore};

/// Placeholder values for profiles the directory could not describe.
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Same answer for unknown user, wrong password, and directory refusal.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("user not found")]
    NotFound,

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{0} is not configured")]
    Misconfigured(&'static str),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::AlreadyExists(detail) => AuthError::AlreadyExists(detail),
            StoreError::NotFound(_) => AuthError::NotFound,
            StoreError::Storage(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(value: TokenError) -> Self {
        AuthError::Internal(value.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(value: PasswordError) -> Self {
        AuthError::Internal(value.to_string())
    }
}

/// Password login attempt.
#[derive(Clone)]
pub struct LoginRequest {
    pub user_id: String,
    /// When absent the lookup matches any user type.
    pub user_type: Option<UserType>,
    pub password: String,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user_id", &self.user_id)
            .field("user_type", &self.user_type)
            .finish_non_exhaustive()
    }
}

/// Direct registration of a local user.
#[derive(Clone, Default)]
pub struct Registration {
    pub user_type: Option<UserType>,
    pub user_id: String,
    pub password: String,
    pub service_no: String,
    pub name: Option<String>,
    pub designation: Option<String>,
    pub section: Option<String>,
    pub group: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,
    /// Defaults to `{User}` when empty.
    pub roles: RoleSet,
    pub branches: Vec<String>,
}

impl core::fmt::Debug for Registration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("user_id", &self.user_id)
            .field("service_no", &self.service_no)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// A successful authentication.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub token: String,
    /// Never empty.
    pub roles: RoleSet,
    pub profile: UserProfile,
    /// Present when the directory authenticated a first-time user.
    pub directory_session: Option<DirectorySession>,
    /// Present for federated logins.
    pub principal_name: Option<String>,
}

pub struct AuthReconciler {
    store: Arc<dyn UserStore>,
    directory: Arc<dyn DirectoryGateway>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    sessions: Arc<SessionIssuer<Arc<dyn Clock>>>,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl AuthReconciler {
    pub fn new(
        store: Arc<dyn UserStore>,
        directory: Arc<dyn DirectoryGateway>,
        sessions: Arc<SessionIssuer<Arc<dyn Clock>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            identity_provider: None,
            sessions,
            hasher: PasswordHasher::default(),
            clock,
        }
    }

    /// Enables federated login.
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Password login
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthOutcome, AuthError> {
        let user_id = request.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(AuthError::BadRequest("userId is required".into()));
        }

        let existing = match &request.user_type {
            Some(user_type) => self.store.find_by_user_id_and_type(&user_id, user_type).await?,
            None => self.store.find_by_user_id(&user_id).await?,
        };

        if let Some(profile) = existing {
            if !self.verify_password(request.password, profile.password_hash.clone()).await? {
                info!("login rejected: password mismatch");
                return Err(AuthError::InvalidCredentials);
            }
            let profile = self.refresh_from_directory(profile).await;
            info!(service_no = %profile.service_no, source = "local", "login succeeded");
            return self.outcome(profile, None, None);
        }

        if !self.directory.is_enabled() {
            info!("login rejected: unknown user and directory disabled");
            return Err(AuthError::InvalidCredentials);
        }

        let session = match self.directory.authenticate(&user_id, &request.password).await {
            Ok(session) => session,
            Err(err) => {
                info!(error = %err, "login rejected by directory");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let profile = self
            .provision_directory_user(&user_id, request.user_type, &session.user)
            .await?;
        info!(service_no = %profile.service_no, source = "directory", "login succeeded");
        self.outcome(profile, Some(session), None)
    }

    /// Overwrite descriptive fields with fresh directory data. Failures are
    /// logged and the stored profile is used as is.
    async fn refresh_from_directory(&self, profile: UserProfile) -> UserProfile {
        if !self.directory.is_enabled() || profile.service_no.is_api_user_marker() {
            return profile;
        }

        let record = match self.directory.fetch_by_service_no(&profile.service_no).await {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "no directory refresh");
                return profile;
            }
        };

        let now = self.clock.now();
        let update = map_record(&record).to_update().synced_at(now);
        match self.store.update(&profile.service_no, update, now).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(error = %err, "failed to persist directory refresh");
                profile
            }
        }
    }

    async fn provision_directory_user(
        &self,
        user_id: &str,
        user_type: Option<UserType>,
        directory_user: &DirectoryUser,
    ) -> Result<UserProfile, AuthError> {
        let key = ServiceNo::parse(user_id).map_err(|e| AuthError::BadRequest(e.to_string()))?;
        let now = self.clock.now();

        let (service_no, update) = match self.directory.fetch_by_service_no(&key).await {
            Ok(record) => {
                let mapped = map_record(&record);
                (
                    mapped.service_no.clone().unwrap_or_else(|| key.clone()),
                    mapped.to_update().synced_at(now),
                )
            }
            Err(err) => {
                debug!(error = %err, "no directory record; provisioning a minimal profile");
                (key.clone(), minimal_directory_update(user_id, directory_user))
            }
        };

        let role = if directory_user.is_admin() { Role::Admin } else { Role::User };
        let user_type = user_type.unwrap_or_default();

        let mut profile = UserProfile::new(
            user_id,
            user_type.clone(),
            service_no.clone(),
            self.placeholder_hash().await?,
            now,
        );
        profile.apply(update.with_roles(RoleSet::single(role)).api_user(), now);

        match self.store.create(profile).await {
            Ok(created) => Ok(created),
            Err(StoreError::AlreadyExists(detail)) => {
                // Only a profile this same directory login would have created
                // may be adopted; anything else is a different account.
                let existing = match self.store.find_by_user_id(user_id).await? {
                    Some(existing) => Some(existing),
                    None => self.store.find_by_service_no(&service_no).await?,
                };
                match existing {
                    Some(existing) if is_concurrent_provision(&existing, user_id, &user_type, &service_no) => {
                        warn!(%detail, "concurrent first login; continuing with the existing profile");
                        Ok(existing)
                    }
                    _ => {
                        info!(%detail, "login rejected: directory account collides with a local profile");
                        Err(AuthError::InvalidCredentials)
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Federated login
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip_all)]
    pub async fn federated_login(&self, access_token: &str) -> Result<AuthOutcome, AuthError> {
        let provider = self
            .identity_provider
            .as_ref()
            .ok_or(AuthError::Misconfigured("identity provider"))?;
        if access_token.trim().is_empty() {
            return Err(AuthError::BadRequest("accessToken is required".into()));
        }

        let me = provider.fetch_me(access_token).await.map_err(|err| match err {
            GraphError::Rejected => AuthError::InvalidCredentials,
            GraphError::Unavailable(msg) => AuthError::UpstreamUnavailable(msg),
        })?;

        let identity = FederatedIdentity::new(
            me.user_principal_name.unwrap_or_default(),
            me.display_name,
            me.mail,
        )
        .map_err(|_| AuthError::InvalidCredentials)?;
        let key = identity.join_key().clone();
        debug!(join_key = %key, has_service_no = identity.service_no.is_some(), "federated identity resolved");

        if let Some(existing) = self.store.find_by_service_no(&key).await? {
            return self.federated_existing(&identity, existing).await;
        }

        let now = self.clock.now();
        let (update, roles) = match self.federated_directory_profile(&identity).await {
            Some(mapped) => (mapped.to_update().synced_at(now), RoleSet::single(mapped.derived_role())),
            None => (minimal_federated_update(&identity), RoleSet::single(Role::User)),
        };

        let mut profile = UserProfile::new(
            identity.principal_name.clone(),
            UserType::default(),
            key.clone(),
            self.placeholder_hash().await?,
            now,
        );
        profile.apply(update.with_roles(roles).azure_user(), now);

        match self.store.create(profile).await {
            Ok(created) => {
                info!(service_no = %created.service_no, source = "federated", "profile provisioned");
                self.outcome(created, None, Some(identity.principal_name))
            }
            Err(StoreError::AlreadyExists(detail)) => {
                warn!(%detail, "concurrent federated first login; retrying as existing profile");
                let existing = self
                    .store
                    .find_by_service_no(&key)
                    .await?
                    .ok_or(AuthError::AlreadyExists(detail))?;
                self.federated_existing(&identity, existing).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn federated_existing(
        &self,
        identity: &FederatedIdentity,
        existing: UserProfile,
    ) -> Result<AuthOutcome, AuthError> {
        let mut profile = existing;

        if let Some(mapped) = self.federated_directory_profile(identity).await {
            let now = self.clock.now();
            let update = mapped.to_update_with_derived_role().azure_user().synced_at(now);
            profile = self.store.update(&profile.service_no, update, now).await?;
        }

        info!(service_no = %profile.service_no, source = "federated", "login succeeded");
        self.outcome(profile, None, Some(identity.principal_name.clone()))
    }

    /// Directory data for a federated identity, when the directory is on and
    /// the principal name carried a service number.
    async fn federated_directory_profile(&self, identity: &FederatedIdentity) -> Option<DirectoryProfile> {
        if !self.directory.is_enabled() {
            return None;
        }
        let service_no = identity.service_no.as_ref()?;
        match self.directory.fetch_by_service_no(service_no).await {
            Ok(record) => Some(map_record(&record)),
            Err(err) => {
                debug!(error = %err, "no directory data for federated identity");
                None
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, registration), fields(user_id = %registration.user_id))]
    pub async fn register(&self, registration: Registration) -> Result<AuthOutcome, AuthError> {
        let user_id = registration.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(AuthError::BadRequest("userId is required".into()));
        }
        if registration.password.is_empty() {
            return Err(AuthError::BadRequest("password is required".into()));
        }
        let service_no =
            ServiceNo::parse(&registration.service_no).map_err(|e| AuthError::BadRequest(e.to_string()))?;
        let branches: BTreeSet<Branch> = registration
            .branches
            .iter()
            .map(Branch::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| AuthError::BadRequest(e.to_string()))?;

        if self.store.find_by_user_id(&user_id).await?.is_some() {
            return Err(AuthError::AlreadyExists(format!("user_id {user_id}")));
        }

        let now = self.clock.now();
        let hash = self.hash_password(registration.password).await?;
        let mut profile = UserProfile::new(
            user_id,
            registration.user_type.unwrap_or_default(),
            service_no,
            hash,
            now,
        );
        profile.apply(
            ProfileUpdate {
                name: registration.name,
                designation: registration.designation,
                section: registration.section,
                group: registration.group,
                contact_no: registration.contact_no,
                email: registration.email,
                ..ProfileUpdate::default()
            }
            .with_roles(registration.roles.or_default_user()),
            now,
        );
        profile.branches = branches;

        let created = self.store.create(profile).await?;
        info!(service_no = %created.service_no, "user registered");
        self.outcome(created, None, None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn outcome(
        &self,
        profile: UserProfile,
        directory_session: Option<DirectorySession>,
        principal_name: Option<String>,
    ) -> Result<AuthOutcome, AuthError> {
        let token = self.sessions.issue(&profile.service_no)?;
        Ok(AuthOutcome {
            token,
            roles: profile.roles.or_default_user(),
            profile,
            directory_session,
            principal_name,
        })
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    async fn placeholder_hash(&self) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.placeholder_hash())
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }
}

/// Profile for a directory-authenticated user the directory could not
/// describe.
/// Whether `existing` is what a directory first login for this request
/// would have provisioned.
fn is_concurrent_provision(
    existing: &UserProfile,
    user_id: &str,
    user_type: &UserType,
    service_no: &ServiceNo,
) -> bool {
    existing.is_api_user
        && existing.user_id == user_id
        && &existing.user_type == user_type
        && &existing.service_no == service_no
}

fn minimal_directory_update(user_id: &str, user: &DirectoryUser) -> ProfileUpdate {
    ProfileUpdate {
        name: Some(non_blank(&user.username).unwrap_or_else(|| user_id.to_string())),
        designation: Some(non_blank(&user.role).unwrap_or_else(|| "API User".to_string())),
        section: Some("API".into()),
        group: Some("API Users".into()),
        contact_no: Some(NOT_AVAILABLE.into()),
        email: Some(non_blank(&user.email).unwrap_or_else(|| format!("{user_id}@example.com"))),
        ..ProfileUpdate::default()
    }
}

/// Profile for a federated user the directory could not describe.
fn minimal_federated_update(identity: &FederatedIdentity) -> ProfileUpdate {
    ProfileUpdate {
        name: Some(non_blank(&identity.display_name).unwrap_or_else(|| identity.principal_name.clone())),
        designation: Some("User".into()),
        section: Some(NOT_AVAILABLE.into()),
        group: Some(NOT_AVAILABLE.into()),
        contact_no: Some(NOT_AVAILABLE.into()),
        email: Some(non_blank(&identity.mail).unwrap_or_else(|| identity.principal_name.clone())),
        ..ProfileUpdate::default()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
