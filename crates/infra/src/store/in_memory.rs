use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatepass_auth::{Branch, ProfileUpdate, Role, UserProfile};
use gatepass_core::{ServiceNo, UserType};

use super::{StoreError, UserStore};

/// In-memory user store (tests and offline development).
///
/// Profiles are keyed by service number; a secondary index keeps `user_id`
/// unique. Both indexes change under one write lock, so concurrent creates
/// for the same person cannot both succeed.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_service_no: HashMap<ServiceNo, UserProfile>,
    service_no_by_user_id: HashMap<String, ServiceNo>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, StoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("user store lock poisoned".into()))?;
        Ok(f(&guard))
    }

    fn sorted(mut profiles: Vec<UserProfile>) -> Vec<UserProfile> {
        profiles.sort_by(|a, b| a.service_no.cmp(&b.service_no));
        profiles
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.read(|inner| {
            inner
                .service_no_by_user_id
                .get(user_id)
                .and_then(|sn| inner.by_service_no.get(sn))
                .cloned()
        })
    }

    async fn find_by_user_id_and_type(
        &self,
        user_id: &str,
        user_type: &UserType,
    ) -> Result<Option<UserProfile>, StoreError> {
        Ok(self
            .find_by_user_id(user_id)
            .await?
            .filter(|p| &p.user_type == user_type))
    }

    async fn find_by_service_no(&self, service_no: &ServiceNo) -> Result<Option<UserProfile>, StoreError> {
        self.read(|inner| inner.by_service_no.get(service_no).cloned())
    }

    async fn create(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("user store lock poisoned".into()))?;

        if inner.service_no_by_user_id.contains_key(&profile.user_id) {
            return Err(StoreError::AlreadyExists(format!("user_id {}", profile.user_id)));
        }
        if inner.by_service_no.contains_key(&profile.service_no) {
            return Err(StoreError::AlreadyExists(format!("service_no {}", profile.service_no)));
        }

        inner
            .service_no_by_user_id
            .insert(profile.user_id.clone(), profile.service_no.clone());
        inner.by_service_no.insert(profile.service_no.clone(), profile.clone());
        Ok(profile)
    }

    async fn update(
        &self,
        service_no: &ServiceNo,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("user store lock poisoned".into()))?;

        let profile = inner
            .by_service_no
            .get_mut(service_no)
            .ok_or_else(|| StoreError::NotFound(service_no.to_string()))?;
        profile.apply(update, at);
        Ok(profile.clone())
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<UserProfile>, StoreError> {
        self.read(|inner| {
            Self::sorted(
                inner
                    .by_service_no
                    .values()
                    .filter(|p| p.has_role(role))
                    .cloned()
                    .collect(),
            )
        })
    }

    async fn find_by_role_and_branch(&self, role: Role, branch: &Branch) -> Result<Vec<UserProfile>, StoreError> {
        self.read(|inner| {
            Self::sorted(
                inner
                    .by_service_no
                    .values()
                    .filter(|p| p.has_role(role) && p.branches.contains(branch))
                    .cloned()
                    .collect(),
            )
        })
    }
}
