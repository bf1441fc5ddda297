//! Postgres-backed policy store.
//!
//! Writes use `ON CONFLICT DO NOTHING` on the tuple primary key, so re-adding
//! a tuple is a cheap no-op and concurrent provisioning never conflicts.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use quire_auth::{Action, GroupingRule, Object, PolicyFilter, PolicyRule, PolicySnapshot, PolicyStore, Role, Subject};
use quire_core::DomainResult;

use super::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresPolicyStore {
    pool: PgPool,
}

impl PostgresPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PolicyStore for PostgresPolicyStore {
    #[instrument(skip_all, fields(role = %rule.role, object = %rule.object, action = %rule.action), err)]
    async fn add_policy(&self, rule: &PolicyRule) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO authz_policies (role, object, action)
            VALUES ($1, $2, $3)
            ON CONFLICT (role, object, action) DO NOTHING
            "#,
        )
        .bind(rule.role.as_str())
        .bind(rule.object.as_str())
        .bind(rule.action.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_policy", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip_all, fields(subject = %rule.subject, role = %rule.role), err)]
    async fn add_grouping(&self, rule: &GroupingRule) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO authz_groupings (subject, role)
            VALUES ($1, $2)
            ON CONFLICT (subject, role) DO NOTHING
            "#,
        )
        .bind(rule.subject.as_str())
        .bind(rule.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_grouping", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip_all, fields(identifiers = filter.len()), err)]
    async fn load_filtered(&self, filter: &PolicyFilter) -> DomainResult<PolicySnapshot> {
        if filter.is_empty() {
            return Ok(PolicySnapshot::default());
        }
        let identifiers: Vec<String> = filter.identifiers().map(str::to_string).collect();

        let policies = sqlx::query("SELECT role, object, action FROM authz_policies WHERE role = ANY($1)")
            .bind(&identifiers)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_filtered", e))?;

        let groupings = sqlx::query(
            "SELECT subject, role FROM authz_groupings WHERE subject = ANY($1) OR role = ANY($1)",
        )
        .bind(&identifiers)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_filtered", e))?;

        let snapshot = decode(&policies, &groupings).map_err(|e| map_sqlx_error("load_filtered", e))?;
        debug!(
            policies = snapshot.policies.len(),
            groupings = snapshot.groupings.len(),
            "loaded policy slice"
        );
        Ok(snapshot)
    }

    #[instrument(skip_all, err)]
    async fn load_all(&self) -> DomainResult<PolicySnapshot> {
        let policies = sqlx::query("SELECT role, object, action FROM authz_policies ORDER BY role, object, action")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_all", e))?;

        let groupings = sqlx::query("SELECT subject, role FROM authz_groupings ORDER BY subject, role")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_all", e))?;

        decode(&policies, &groupings).map_err(|e| map_sqlx_error("load_all", e))
    }
}

fn decode(policies: &[PgRow], groupings: &[PgRow]) -> Result<PolicySnapshot, sqlx::Error> {
    let policies = policies
        .iter()
        .map(|row| {
            Ok(PolicyRule::new(
                Role::new(row.try_get::<String, _>("role")?),
                Object::new(row.try_get::<String, _>("object")?),
                Action::new(row.try_get::<String, _>("action")?),
            ))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let groupings = groupings
        .iter()
        .map(|row| {
            Ok(GroupingRule::new(
                Subject::new(row.try_get::<String, _>("subject")?),
                Role::new(row.try_get::<String, _>("role")?),
            ))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(PolicySnapshot { policies, groupings })
}
