//! Read-side user queries and administrative role grants.
//!
//! Also hosts principal resolution for the authorization gate: local store
//! first, directory read-through second. The read-through never writes a
//! local record.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use gatepass_auth::{Branch, ProfileUpdate, ProfileView, Role, RoleSet};
use gatepass_core::{Clock, ServiceNo};

use crate::directory::{DirectoryError, DirectoryGateway, SupervisorView, map_record, map_supervisor};
use crate::store::{StoreError, UserStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserQueryError {
    #[error("user not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for UserQueryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(_) => UserQueryError::NotFound,
            StoreError::AlreadyExists(detail) => UserQueryError::Internal(detail),
            StoreError::Storage(msg) => UserQueryError::Internal(msg),
        }
    }
}

/// Where a request principal was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalSource {
    Local,
    Directory,
}

/// The acting user of an authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrincipal {
    pub profile: ProfileView,
    /// Never empty.
    pub roles: RoleSet,
    pub source: PrincipalSource,
}

pub struct UserQueries {
    store: Arc<dyn UserStore>,
    directory: Arc<dyn DirectoryGateway>,
    clock: Arc<dyn Clock>,
}

impl UserQueries {
    pub fn new(store: Arc<dyn UserStore>, directory: Arc<dyn DirectoryGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Resolve the owner of a verified session.
    ///
    /// `Ok(None)` means no source knows the service number.
    #[instrument(skip(self), err)]
    pub async fn resolve_principal(
        &self,
        service_no: &ServiceNo,
    ) -> Result<Option<ResolvedPrincipal>, UserQueryError> {
        if let Some(profile) = self.store.find_by_service_no(service_no).await? {
            return Ok(Some(ResolvedPrincipal {
                roles: profile.roles.or_default_user(),
                profile: profile.view(),
                source: PrincipalSource::Local,
            }));
        }

        Ok(self.directory_view(service_no).await.map(|profile| ResolvedPrincipal {
            roles: profile.roles.clone(),
            profile,
            source: PrincipalSource::Directory,
        }))
    }

    /// Profile by service number: the local record (refreshed from the
    /// directory when possible), else a directory read-through.
    #[instrument(skip(self), err)]
    pub async fn profile_by_service_no(&self, service_no: &ServiceNo) -> Result<ProfileView, UserQueryError> {
        let Some(profile) = self.store.find_by_service_no(service_no).await? else {
            return self.directory_view(service_no).await.ok_or(UserQueryError::NotFound);
        };

        if !self.directory.is_enabled() || service_no.is_api_user_marker() {
            return Ok(profile.view());
        }

        match self.directory.fetch_by_service_no(service_no).await {
            Ok(record) => {
                let now = self.clock.now();
                let update = map_record(&record).to_update().synced_at(now);
                match self.store.update(service_no, update, now).await {
                    Ok(updated) => Ok(updated.view()),
                    Err(err) => {
                        warn!(error = %err, "failed to persist directory refresh");
                        Ok(profile.view())
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "serving stored profile without refresh");
                Ok(profile.view())
            }
        }
    }

    #[instrument(skip(self), err)]
    pub async fn by_role(&self, role: Role) -> Result<Vec<ProfileView>, UserQueryError> {
        let profiles = self.store.find_by_role(role).await?;
        Ok(profiles.iter().map(|p| p.view()).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn pleaders_by_branch(&self, branch: &Branch) -> Result<Vec<ProfileView>, UserQueryError> {
        let profiles = self.store.find_by_role_and_branch(Role::Pleader, branch).await?;
        Ok(profiles.iter().map(|p| p.view()).collect())
    }

    /// Supervisor chain, nearest first.
    ///
    /// Offline this is best effort: the supervisor recorded on the local
    /// profile, or nothing.
    #[instrument(skip(self), err)]
    pub async fn supervisors(&self, service_no: &ServiceNo) -> Result<Vec<SupervisorView>, UserQueryError> {
        if self.directory.is_enabled() {
            return match self.directory.supervisor_hierarchy(service_no).await {
                Ok(records) => Ok(records.iter().map(map_supervisor).collect()),
                Err(DirectoryError::NotFound) => Err(UserQueryError::NotFound),
                Err(err) => {
                    warn!(error = %err, "supervisor hierarchy lookup failed");
                    Err(UserQueryError::UpstreamUnavailable(err.to_string()))
                }
            };
        }

        let Some(profile) = self.store.find_by_service_no(service_no).await? else {
            return Ok(Vec::new());
        };
        let Some(supervisor_no) = profile.supervisor_service_no else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .find_by_service_no(&supervisor_no)
            .await?
            .map(|s| vec![SupervisorView::from_profile(&s)])
            .unwrap_or_default())
    }

    /// Union `roles` into the stored set. Roles are never removed.
    #[instrument(skip(self), err)]
    pub async fn grant_roles(&self, service_no: &ServiceNo, roles: RoleSet) -> Result<ProfileView, UserQueryError> {
        if roles.is_empty() {
            return Err(UserQueryError::BadRequest("at least one role is required".into()));
        }
        let now = self.clock.now();
        let updated = self
            .store
            .update(service_no, ProfileUpdate::default().with_roles(roles), now)
            .await?;
        Ok(updated.view())
    }

    async fn directory_view(&self, service_no: &ServiceNo) -> Option<ProfileView> {
        if !self.directory.is_enabled() {
            return None;
        }
        match self.directory.fetch_by_service_no(service_no).await {
            Ok(record) => {
                let update = map_record(&record)
                    .to_update()
                    .synced_at(self.clock.now())
                    .with_roles(RoleSet::single(Role::User));
                Some(ProfileView::unstored(service_no.clone(), update))
            }
            Err(err) => {
                debug!(error = %err, "directory read-through found nothing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use gatepass_auth::UserProfile;
    use gatepass_core::{ManualClock, UserType};

    use super::*;
    use crate::config::DirectoryConfig;
    use crate::directory::{DirectoryRecord, DirectorySession, HttpDirectoryGateway};
    use crate::store::InMemoryUserStore;

    struct Offline;

    #[async_trait]
    impl DirectoryGateway for Offline {
        fn is_enabled(&self) -> bool {
            false
        }
        async fn fetch_by_service_no(&self, _: &ServiceNo) -> Result<DirectoryRecord, DirectoryError> {
            Err(DirectoryError::Disabled)
        }
        async fn authenticate(&self, _: &str, _: &str) -> Result<DirectorySession, DirectoryError> {
            Err(DirectoryError::Disabled)
        }
        async fn supervisor_hierarchy(&self, _: &ServiceNo) -> Result<Vec<DirectoryRecord>, DirectoryError> {
            Err(DirectoryError::Disabled)
        }
    }

    fn sn(s: &str) -> ServiceNo {
        ServiceNo::parse(s).unwrap()
    }

    fn stored(user_id: &str, service_no: &str, roles: RoleSet) -> UserProfile {
        let mut p = UserProfile::new(user_id, UserType::default(), sn(service_no), "hash".into(), Utc::now());
        p.roles = roles;
        p.name = Some("Stored Name".into());
        p
    }

    fn queries(store: Arc<InMemoryUserStore>, directory: Arc<dyn DirectoryGateway>) -> UserQueries {
        UserQueries::new(store, directory, Arc::new(ManualClock::default()))
    }

    fn online(server: &MockServer) -> Arc<dyn DirectoryGateway> {
        let mut cfg = DirectoryConfig::enabled_at(url::Url::parse(&server.uri()).unwrap());
        cfg.max_retries = 0;
        Arc::new(HttpDirectoryGateway::new(&cfg).unwrap())
    }

    async fn mount_employee(server: &MockServer, service_no: &str, grade: &str) {
        Mock::given(method("GET"))
            .and(path("/GetEmployeeDetails"))
            .and(query_param("queryValue", service_no))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": true,
                "dataBundle": [{
                    "EMPLOYEE_NUMBER": service_no,
                    "EMPLOYEE_FIRST_NAME": "Jane",
                    "EMPLOYEE_SURNAME": "Perera",
                    "EMPLOYEE_SALARY_GRADE": grade
                }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn local_principal_wins() {
        let store = Arc::new(InMemoryUserStore::new());
        store
            .create(stored("jdoe", "123456", RoleSet::from([Role::Approver, Role::User])))
            .await
            .unwrap();

        let principal = queries(store, Arc::new(Offline))
            .resolve_principal(&sn("123456"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.source, PrincipalSource::Local);
        assert_eq!(principal.roles, RoleSet::from([Role::Approver, Role::User]));
    }

    #[tokio::test]
    async fn directory_read_through_is_user_and_not_persisted() {
        let server = MockServer::start().await;
        mount_employee(&server, "654321", "A.1.").await;
        let store = Arc::new(InMemoryUserStore::new());
        let q = queries(store.clone(), online(&server));

        let principal = q.resolve_principal(&sn("654321")).await.unwrap().unwrap();
        assert_eq!(principal.source, PrincipalSource::Directory);
        assert_eq!(principal.roles, RoleSet::single(Role::User));
        assert_eq!(principal.profile.name.as_deref(), Some("Jane Perera"));
        assert!(store.find_by_service_no(&sn("654321")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_everywhere_is_none() {
        let store = Arc::new(InMemoryUserStore::new());
        let q = queries(store, Arc::new(Offline));
        assert!(q.resolve_principal(&sn("999999")).await.unwrap().is_none());
        assert_eq!(
            q.profile_by_service_no(&sn("999999")).await.unwrap_err(),
            UserQueryError::NotFound
        );
    }

    #[tokio::test]
    async fn profile_lookup_refreshes_local_record() {
        let server = MockServer::start().await;
        mount_employee(&server, "123456", "B.1.").await;
        let store = Arc::new(InMemoryUserStore::new());
        store
            .create(stored("jdoe", "123456", RoleSet::single(Role::Dispatcher)))
            .await
            .unwrap();

        let view = queries(store.clone(), online(&server))
            .profile_by_service_no(&sn("123456"))
            .await
            .unwrap();
        assert_eq!(view.name.as_deref(), Some("Jane Perera"));
        assert_eq!(view.roles, RoleSet::single(Role::Dispatcher));
        assert!(view.last_synced_at.is_some());

        let persisted = store.find_by_service_no(&sn("123456")).await.unwrap().unwrap();
        assert_eq!(persisted.name.as_deref(), Some("Jane Perera"));
    }

    #[tokio::test]
    async fn profile_lookup_offline_serves_stored_copy() {
        let store = Arc::new(InMemoryUserStore::new());
        store
            .create(stored("jdoe", "123456", RoleSet::single(Role::User)))
            .await
            .unwrap();
        let view = queries(store, Arc::new(Offline))
            .profile_by_service_no(&sn("123456"))
            .await
            .unwrap();
        assert_eq!(view.name.as_deref(), Some("Stored Name"));
    }

    #[tokio::test]
    async fn pleaders_are_filtered_by_branch() {
        let store = Arc::new(InMemoryUserStore::new());
        let colombo = Branch::parse("Colombo").unwrap();
        let mut a = stored("a", "000001", RoleSet::single(Role::Pleader));
        a.branches.insert(colombo.clone());
        let b = stored("b", "000002", RoleSet::single(Role::Pleader));
        store.create(a).await.unwrap();
        store.create(b).await.unwrap();

        let q = queries(store, Arc::new(Offline));
        let found = q.pleaders_by_branch(&colombo).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "a");
        assert_eq!(q.by_role(Role::Pleader).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn offline_supervisors_use_recorded_supervisor() {
        let store = Arc::new(InMemoryUserStore::new());
        let mut worker = stored("w", "100001", RoleSet::single(Role::User));
        worker.supervisor_service_no = Some(sn("100002"));
        let mut boss = stored("b", "100002", RoleSet::single(Role::Approver));
        boss.email = Some("boss@corp.example".into());
        store.create(worker).await.unwrap();
        store.create(boss).await.unwrap();

        let q = queries(store, Arc::new(Offline));
        let chain = q.supervisors(&sn("100001")).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].service_no.as_deref(), Some("100002"));
        assert_eq!(chain[0].email.as_deref(), Some("boss@corp.example"));

        assert!(q.supervisors(&sn("100002")).await.unwrap().is_empty());
        assert!(q.supervisors(&sn("999999")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn synced_supervisor_is_available_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/GetEmployeeDetails"))
            .and(query_param("queryValue", "100001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": true,
                "dataBundle": [{
                    "EMPLOYEE_NUMBER": "100001",
                    "EMPLOYEE_FIRST_NAME": "Wes",
                    "EMPLOYEE_IMM_ES_SERVICE_NO": 100002
                }]
            })))
            .mount(&server)
            .await;
        let store = Arc::new(InMemoryUserStore::new());
        store
            .create(stored("w", "100001", RoleSet::single(Role::User)))
            .await
            .unwrap();
        store
            .create(stored("b", "100002", RoleSet::single(Role::Approver)))
            .await
            .unwrap();

        queries(store.clone(), online(&server))
            .profile_by_service_no(&sn("100001"))
            .await
            .unwrap();

        let chain = queries(store, Arc::new(Offline))
            .supervisors(&sn("100001"))
            .await
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].service_no.as_deref(), Some("100002"));
    }

    #[tokio::test]
    async fn online_supervisors_come_from_the_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/GetSupervisorHierachy"))
            .and(query_param("serviceNumber", "100001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": true,
                "dataBundle": [
                    { "EMPLOYEE_NUMBER": "100002", "EMPLOYEE_FIRST_NAME": "Sam", "EMPLOYEE_SALARY_GRADE": "A.2." }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/GetSupervisorHierachy"))
            .and(query_param("serviceNumber", "100009"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let q = queries(Arc::new(InMemoryUserStore::new()), online(&server));
        let chain = q.supervisors(&sn("100001")).await.unwrap();
        assert_eq!(chain[0].service_no.as_deref(), Some("100002"));
        assert_eq!(chain[0].salary_grade.as_deref(), Some("A.2."));

        assert!(matches!(
            q.supervisors(&sn("100009")).await,
            Err(UserQueryError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn grant_roles_only_adds() {
        let store = Arc::new(InMemoryUserStore::new());
        store
            .create(stored("jdoe", "123456", RoleSet::single(Role::User)))
            .await
            .unwrap();
        let q = queries(store, Arc::new(Offline));

        let view = q
            .grant_roles(&sn("123456"), RoleSet::single(Role::Verifier))
            .await
            .unwrap();
        assert_eq!(view.roles, RoleSet::from([Role::User, Role::Verifier]));

        assert_eq!(
            q.grant_roles(&sn("000000"), RoleSet::single(Role::Admin))
                .await
                .unwrap_err(),
            UserQueryError::NotFound
        );
        assert!(matches!(
            q.grant_roles(&sn("123456"), RoleSet::new()).await,
            Err(UserQueryError::BadRequest(_))
        ));
    }
}
