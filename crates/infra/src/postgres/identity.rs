//! Postgres-backed identity repositories.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use quire_core::{AppUserId, DomainError, DomainResult, GroupId, OrganizationId, SpaceId};
use quire_identity::model::{PUBLIC_GROUP_KEY, PUBLIC_GROUP_NAME};
use quire_identity::{
    AppUser, AppUserRepository, GroupRepository, NewAppUser, NewOrganization, NewSpace, Organization,
    OrganizationRepository, Space, SpaceRepository, SpaceType, UserGroup,
};

use super::map_sqlx_error;

// ─────────────────────────────────────────────────────────────────────────
// Organizations
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresOrganizations {
    pool: PgPool,
}

impl PostgresOrganizations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrganizationRepository for PostgresOrganizations {
    #[instrument(skip(self), fields(organization_id = %id), err)]
    async fn find_by_id(&self, id: OrganizationId) -> DomainResult<Organization> {
        sqlx::query_as::<_, OrganizationRow>("SELECT id, name, created_at FROM organizations WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_organization", e))?
            .map(Organization::from)
            .ok_or_else(|| DomainError::not_found(format!("organization {id}")))
    }

    #[instrument(skip(self), err)]
    async fn find_by_name(&self, name: &str) -> DomainResult<Organization> {
        sqlx::query_as::<_, OrganizationRow>("SELECT id, name, created_at FROM organizations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_organization", e))?
            .map(Organization::from)
            .ok_or_else(|| DomainError::not_found(format!("organization '{name}'")))
    }

    #[instrument(skip_all, fields(name = %input.name), err)]
    async fn create(&self, input: &NewOrganization) -> DomainResult<OrganizationId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO organizations (name) VALUES ($1) RETURNING id")
            .bind(&input.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_organization", e))?;
        Ok(OrganizationId::new(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// App users
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresAppUsers {
    pool: PgPool,
}

impl PostgresAppUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const APP_USER_COLUMNS: &str = "id, organization_id, login_id, username, role_labels, created_at";

#[async_trait::async_trait]
impl AppUserRepository for PostgresAppUsers {
    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %id), err)]
    async fn find_by_id(&self, organization_id: OrganizationId, id: AppUserId) -> DomainResult<AppUser> {
        let sql = format!("SELECT {APP_USER_COLUMNS} FROM app_users WHERE organization_id = $1 AND id = $2");
        sqlx::query_as::<_, AppUserRow>(&sql)
            .bind(organization_id.value())
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_app_user", e))?
            .map(AppUser::from)
            .ok_or_else(|| DomainError::not_found(format!("app user {id} in organization {organization_id}")))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn find_by_login_id(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<AppUser> {
        let sql = format!("SELECT {APP_USER_COLUMNS} FROM app_users WHERE organization_id = $1 AND login_id = $2");
        sqlx::query_as::<_, AppUserRow>(&sql)
            .bind(organization_id.value())
            .bind(login_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_app_user", e))?
            .map(AppUser::from)
            .ok_or_else(|| {
                DomainError::not_found(format!("app user '{login_id}' in organization {organization_id}"))
            })
    }

    #[instrument(skip_all, fields(organization_id = %input.organization_id, login_id = %input.login_id), err)]
    async fn create(&self, input: &NewAppUser) -> DomainResult<AppUserId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO app_users (organization_id, login_id, username, role_labels)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.organization_id.value())
        .bind(&input.login_id)
        .bind(&input.username)
        .bind(&input.role_labels)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_app_user", e))?;
        Ok(AppUserId::new(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Spaces
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresSpaces {
    pool: PgPool,
}

impl PostgresSpaces {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SpaceRepository for PostgresSpaces {
    #[instrument(skip(self), fields(organization_id = %organization_id, space_type = %space_type), err)]
    async fn find_by_type_and_key(
        &self,
        organization_id: OrganizationId,
        space_type: SpaceType,
        key: &str,
    ) -> DomainResult<Space> {
        let row = sqlx::query_as::<_, SpaceRow>(
            r#"
            SELECT id, organization_id, space_type, key, name, created_at
            FROM spaces
            WHERE organization_id = $1 AND space_type = $2 AND key = $3
            "#,
        )
        .bind(organization_id.value())
        .bind(space_type.code())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_space", e))?
        .ok_or_else(|| {
            DomainError::not_found(format!("{space_type} space '{key}' in organization {organization_id}"))
        })?;

        row.into_space()
    }

    #[instrument(skip_all, fields(organization_id = %input.organization_id, space_type = %input.space_type), err)]
    async fn create(&self, input: &NewSpace) -> DomainResult<SpaceId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO spaces (organization_id, space_type, key, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.organization_id.value())
        .bind(input.space_type.code())
        .bind(&input.key)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_space", e))?;
        Ok(SpaceId::new(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Groups
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresGroups {
    pool: PgPool,
}

impl PostgresGroups {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GroupRepository for PostgresGroups {
    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn find_public_group(&self, organization_id: OrganizationId) -> DomainResult<UserGroup> {
        sqlx::query_as::<_, GroupRow>(
            "SELECT id, organization_id, key, name FROM user_groups WHERE organization_id = $1 AND key = $2",
        )
        .bind(organization_id.value())
        .bind(PUBLIC_GROUP_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_public_group", e))?
        .map(UserGroup::from)
        .ok_or_else(|| DomainError::not_found(format!("public group of organization {organization_id}")))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn create_public_group(&self, organization_id: OrganizationId) -> DomainResult<GroupId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO user_groups (organization_id, key, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(organization_id.value())
        .bind(PUBLIC_GROUP_KEY)
        .bind(PUBLIC_GROUP_NAME)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_public_group", e))?;
        Ok(GroupId::new(id))
    }

    #[instrument(skip(self), fields(group_id = %group_id, user_id = %user_id), err)]
    async fn add_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_group_members (group_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_id.value())
        .bind(user_id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_group_member", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_group_members WHERE group_id = $1 AND user_id = $2)",
        )
        .bind(group_id.value())
        .bind(user_id.value())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_group_member", e))
    }
}

// SQLx row types

#[derive(Debug)]
struct OrganizationRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrganizationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrganizationRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: OrganizationId::new(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct AppUserRow {
    id: i64,
    organization_id: i64,
    login_id: String,
    username: String,
    role_labels: Vec<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AppUserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AppUserRow {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            login_id: row.try_get("login_id")?,
            username: row.try_get("username")?,
            role_labels: row.try_get("role_labels")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<AppUserRow> for AppUser {
    fn from(row: AppUserRow) -> Self {
        AppUser {
            id: AppUserId::new(row.id),
            organization_id: OrganizationId::new(row.organization_id),
            login_id: row.login_id,
            username: row.username,
            role_labels: row.role_labels,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct SpaceRow {
    id: i64,
    organization_id: i64,
    space_type: i16,
    key: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SpaceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SpaceRow {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            space_type: row.try_get("space_type")?,
            key: row.try_get("key")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl SpaceRow {
    fn into_space(self) -> DomainResult<Space> {
        Ok(Space {
            id: SpaceId::new(self.id),
            organization_id: OrganizationId::new(self.organization_id),
            space_type: SpaceType::from_code(self.space_type)?,
            key: self.key,
            name: self.name,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug)]
struct GroupRow {
    id: i64,
    organization_id: i64,
    key: String,
    name: String,
}

impl<'r> FromRow<'r, PgRow> for GroupRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GroupRow {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            key: row.try_get("key")?,
            name: row.try_get("name")?,
        })
    }
}

impl From<GroupRow> for UserGroup {
    fn from(row: GroupRow) -> Self {
        UserGroup {
            id: GroupId::new(row.id),
            organization_id: OrganizationId::new(row.organization_id),
            key: row.key,
            name: row.name,
        }
    }
}
