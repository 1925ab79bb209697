//! Postgres-backed user store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |
//!
//! ## Concurrency
//!
//! `update` reads the row `FOR UPDATE` inside a transaction, merges in Rust
//! with [`UserProfile::apply`], and writes the result back, so concurrent
//! role unions never lose a role.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use gatepass_auth::{Branch, ProfileUpdate, Role, RoleSet, UserProfile};
use gatepass_core::{ProfileId, ServiceNo, UserType};

use super::{StoreError, UserStore};

/// Statements creating the schema; each is idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        id                    UUID PRIMARY KEY,
        user_type             TEXT NOT NULL,
        user_id               TEXT NOT NULL,
        service_no            TEXT NOT NULL,
        password_hash         TEXT NOT NULL,
        name                  TEXT NULL,
        designation           TEXT NULL,
        section               TEXT NULL,
        group_name            TEXT NULL,
        contact_no            TEXT NULL,
        email                 TEXT NULL,
        roles                 TEXT[] NOT NULL DEFAULT '{}',
        branches              TEXT[] NOT NULL DEFAULT '{}',
        is_api_user           BOOLEAN NOT NULL DEFAULT FALSE,
        is_azure_user         BOOLEAN NOT NULL DEFAULT FALSE,
        last_synced_at        TIMESTAMPTZ NULL,
        directory_snapshot    JSONB NULL,
        supervisor_service_no TEXT NULL,
        created_at            TIMESTAMPTZ NOT NULL,
        updated_at            TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS user_profiles_user_id_key ON user_profiles (user_id)",
    // Covers the API_USER marker too: one profile may carry it.
    "CREATE UNIQUE INDEX IF NOT EXISTS user_profiles_service_no_key ON user_profiles (service_no)",
    "CREATE INDEX IF NOT EXISTS user_profiles_roles_idx ON user_profiles USING GIN (roles)",
];

const COLUMNS: &str = r#"
    id, user_type, user_id, service_no, password_hash,
    name, designation, section, group_name, contact_no, email,
    roles, branches, is_api_user, is_azure_user,
    last_synced_at, directory_snapshot, supervisor_service_no,
    created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the table and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        operation: &str,
        clause: &str,
        binds: &[&str],
    ) -> Result<Option<UserProfile>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM user_profiles WHERE {clause}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|r| profile_from_row(&r)).transpose()
    }

    async fn fetch_all_where(
        &self,
        operation: &str,
        clause: &str,
        binds: &[&str],
    ) -> Result<Vec<UserProfile>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM user_profiles WHERE {clause} ORDER BY service_no");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(profile_from_row).collect()
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self), err)]
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.fetch_one_where("find_by_user_id", "user_id = $1", &[user_id]).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_user_id_and_type(
        &self,
        user_id: &str,
        user_type: &UserType,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.fetch_one_where(
            "find_by_user_id_and_type",
            "user_id = $1 AND user_type = $2",
            &[user_id, user_type.as_str()],
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_service_no(&self, service_no: &ServiceNo) -> Result<Option<UserProfile>, StoreError> {
        self.fetch_one_where("find_by_service_no", "service_no = $1", &[service_no.as_str()])
            .await
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.user_id, service_no = %profile.service_no), err)]
    async fn create(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (
                id, user_type, user_id, service_no, password_hash,
                name, designation, section, group_name, contact_no, email,
                roles, branches, is_api_user, is_azure_user,
                last_synced_at, directory_snapshot, supervisor_service_no,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(profile.user_type.as_str())
        .bind(&profile.user_id)
        .bind(profile.service_no.as_str())
        .bind(&profile.password_hash)
        .bind(&profile.name)
        .bind(&profile.designation)
        .bind(&profile.section)
        .bind(&profile.group)
        .bind(&profile.contact_no)
        .bind(&profile.email)
        .bind(role_names(&profile.roles))
        .bind(branch_names(&profile.branches))
        .bind(profile.is_api_user)
        .bind(profile.is_azure_user)
        .bind(profile.last_synced_at)
        .bind(&profile.directory_snapshot)
        .bind(profile.supervisor_service_no.as_ref().map(|s| s.as_str().to_string()))
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        Ok(profile)
    }

    #[instrument(skip(self, update), err)]
    async fn update(
        &self,
        service_no: &ServiceNo,
        update: ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("update", e))?;

        let sql = format!("SELECT {COLUMNS} FROM user_profiles WHERE service_no = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(service_no.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .ok_or_else(|| StoreError::NotFound(service_no.to_string()))?;

        let mut profile = profile_from_row(&row)?;
        profile.apply(update, at);

        sqlx::query(
            r#"
            UPDATE user_profiles SET
                name = $2,
                designation = $3,
                section = $4,
                group_name = $5,
                contact_no = $6,
                email = $7,
                roles = $8,
                is_api_user = $9,
                is_azure_user = $10,
                last_synced_at = $11,
                directory_snapshot = $12,
                supervisor_service_no = $13,
                updated_at = $14
            WHERE service_no = $1
            "#,
        )
        .bind(service_no.as_str())
        .bind(&profile.name)
        .bind(&profile.designation)
        .bind(&profile.section)
        .bind(&profile.group)
        .bind(&profile.contact_no)
        .bind(&profile.email)
        .bind(role_names(&profile.roles))
        .bind(profile.is_api_user)
        .bind(profile.is_azure_user)
        .bind(profile.last_synced_at)
        .bind(&profile.directory_snapshot)
        .bind(profile.supervisor_service_no.as_ref().map(|s| s.as_str().to_string()))
        .bind(profile.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("update", e))?;
        Ok(profile)
    }

    #[instrument(skip(self), err)]
    async fn find_by_role(&self, role: Role) -> Result<Vec<UserProfile>, StoreError> {
        self.fetch_all_where("find_by_role", "$1 = ANY(roles)", &[role.as_str()])
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_role_and_branch(&self, role: Role, branch: &Branch) -> Result<Vec<UserProfile>, StoreError> {
        self.fetch_all_where(
            "find_by_role_and_branch",
            "$1 = ANY(roles) AND $2 = ANY(branches)",
            &[role.as_str(), branch.as_str()],
        )
        .await
    }
}

fn role_names(roles: &RoleSet) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

fn branch_names(branches: &BTreeSet<Branch>) -> Vec<String> {
    branches.iter().map(|b| b.as_str().to_string()).collect()
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Storage(format!("failed to read column {name}: {e}")))
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile, StoreError> {
    let invalid = |what: &str, e: gatepass_core::DomainError| StoreError::Storage(format!("invalid {what} in row: {e}"));

    let roles = column::<Vec<String>>(row, "roles")?
        .iter()
        .map(|r| r.parse::<Role>())
        .collect::<Result<RoleSet, _>>()
        .map_err(|e| invalid("role", e))?;
    let branches = column::<Vec<String>>(row, "branches")?
        .iter()
        .map(Branch::parse)
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|e| invalid("branch", e))?;
    let service_no = ServiceNo::parse(column::<String>(row, "service_no")?).map_err(|e| invalid("service_no", e))?;
    let supervisor_service_no = column::<Option<String>>(row, "supervisor_service_no")?
        .map(ServiceNo::parse)
        .transpose()
        .map_err(|e| invalid("supervisor_service_no", e))?;

    Ok(UserProfile {
        id: ProfileId::from_uuid(column::<Uuid>(row, "id")?),
        user_type: UserType::new(column::<String>(row, "user_type")?),
        user_id: column(row, "user_id")?,
        service_no,
        password_hash: column(row, "password_hash")?,
        name: column(row, "name")?,
        designation: column(row, "designation")?,
        section: column(row, "section")?,
        group: column(row, "group_name")?,
        contact_no: column(row, "contact_no")?,
        email: column(row, "email")?,
        roles,
        branches,
        is_api_user: column(row, "is_api_user")?,
        is_azure_user: column(row, "is_azure_user")?,
        last_synced_at: column(row, "last_synced_at")?,
        directory_snapshot: column(row, "directory_snapshot")?,
        supervisor_service_no,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {}", operation)),
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_enforces_both_unique_keys() {
        let joined = SCHEMA.join("\n");
        assert!(joined.contains("UNIQUE INDEX IF NOT EXISTS user_profiles_user_id_key"));
        assert!(joined.contains("UNIQUE INDEX IF NOT EXISTS user_profiles_service_no_key"));
    }

    #[test]
    fn role_names_are_canonical() {
        let names = role_names(&RoleSet::from([Role::SuperAdmin, Role::User]));
        assert_eq!(names, vec!["User".to_string(), "SuperAdmin".to_string()]);
    }

    #[test]
    fn non_database_errors_are_storage() {
        assert!(matches!(
            map_sqlx_error("create", sqlx::Error::PoolClosed),
            StoreError::Storage(_)
        ));
        assert!(matches!(
            map_sqlx_error("find", sqlx::Error::RowNotFound),
            StoreError::Storage(_)
        ));
    }
}
