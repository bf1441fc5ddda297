//! Idempotent schema setup.

use sqlx::PgPool;
use tracing::{info, instrument};

use quire_core::DomainResult;

use super::map_sqlx_error;

/// Applied in order inside one transaction. Every statement is re-runnable.
const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // ID 1 belongs to the process-wide system admin.
    r#"CREATE SEQUENCE IF NOT EXISTS app_users_id_seq START WITH 2"#,
    r#"
    CREATE TABLE IF NOT EXISTS app_users (
        id               BIGINT PRIMARY KEY DEFAULT nextval('app_users_id_seq'),
        organization_id  BIGINT NOT NULL REFERENCES organizations(id),
        login_id         TEXT NOT NULL,
        username         TEXT NOT NULL,
        role_labels      TEXT[] NOT NULL DEFAULT '{}',
        created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (organization_id, login_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS spaces (
        id               BIGSERIAL PRIMARY KEY,
        organization_id  BIGINT NOT NULL REFERENCES organizations(id),
        space_type       SMALLINT NOT NULL,
        key              TEXT NOT NULL,
        name             TEXT NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (organization_id, space_type, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        id               BIGSERIAL PRIMARY KEY,
        organization_id  BIGINT NOT NULL REFERENCES organizations(id),
        key              TEXT NOT NULL,
        name             TEXT NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (organization_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_group_members (
        group_id  BIGINT NOT NULL REFERENCES user_groups(id),
        user_id   BIGINT NOT NULL REFERENCES app_users(id),
        PRIMARY KEY (group_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authz_policies (
        role    TEXT NOT NULL,
        object  TEXT NOT NULL,
        action  TEXT NOT NULL,
        PRIMARY KEY (role, object, action)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authz_groupings (
        subject  TEXT NOT NULL,
        role     TEXT NOT NULL,
        PRIMARY KEY (subject, role)
    )
    "#,
    // Filtered loads match groupings on either column.
    r#"CREATE INDEX IF NOT EXISTS authz_groupings_role_idx ON authz_groupings (role)"#,
];

#[instrument(skip_all, err)]
pub async fn migrate(pool: &PgPool) -> DomainResult<()> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("migrate", e))?;
    for statement in STATEMENTS.iter().copied() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    tx.commit().await.map_err(|e| map_sqlx_error("migrate", e))?;

    info!(statements = STATEMENTS.len(), "schema up to date");
    Ok(())
}
