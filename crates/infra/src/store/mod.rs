//! Local identity store: the durable record of known users.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use gatepass_auth::{Branch, ProfileUpdate, Role, UserProfile};
use gatepass_core::{ServiceNo, UserType};

pub use in_memory::InMemoryUserStore;
pub use postgres::PostgresUserStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A profile with the same `user_id` or `service_no` already exists.
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Storage abstraction for user profiles.
///
/// Uniqueness holds on `user_id` and on `service_no`. Profiles are never
/// deleted through this interface.
///
/// `service_no` is also the key for `update` and lookups, so the shared
/// [`ServiceNo::API_USER`] marker can be held by one profile only; a second
/// registration carrying it is `AlreadyExists`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    async fn find_by_user_id_and_type(
        &self,
        user_id: &str,
        user_type: &UserType,
    ) -> Result<Option<UserProfile>, StoreError>;

    async fn find_by_service_no(&self, service_no: &ServiceNo) -> Result<Option<UserProfile>, StoreError>;

    /// Insert a new profile. Fails with `AlreadyExists` on a duplicate key.
    async fn create(&self, profile: UserProfile) -> Result<UserProfile, StoreError>;

    /// Merge `update` into the stored profile (see [`UserProfile::apply`]).
    async fn update(
        &self,
        service_no: &ServiceNo,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError>;

    async fn find_by_role(&self, role: Role) -> Result<Vec<UserProfile>, StoreError>;

    async fn find_by_role_and_branch(&self, role: Role, branch: &Branch) -> Result<Vec<UserProfile>, StoreError>;
}
