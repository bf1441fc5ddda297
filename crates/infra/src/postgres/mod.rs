//! PostgreSQL adapters for every persistence contract.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | DomainError |
//! |------------|----------------------|-------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | RowNotFound | N/A | `NotFound` |
//! | anything else | any | `Storage` |

mod identity;
mod policy;
mod schema;

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use quire_core::DomainError;
use quire_identity::IdentityStores;

use crate::settings::Settings;

pub use identity::{PostgresAppUsers, PostgresGroups, PostgresOrganizations, PostgresSpaces};
pub use policy::PostgresPolicyStore;
pub use schema::migrate;

/// Open a connection pool from settings.
pub async fn connect(settings: &Settings) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    info!(max_connections = settings.database.max_connections, "database pool ready");
    Ok(pool)
}

/// Every Postgres adapter over one shared pool.
#[derive(Debug, Clone)]
pub struct PostgresStores {
    pool: PgPool,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn policies(&self) -> PostgresPolicyStore {
        PostgresPolicyStore::new(self.pool.clone())
    }

    pub fn identity_stores(&self) -> IdentityStores {
        IdentityStores {
            organizations: Arc::new(PostgresOrganizations::new(self.pool.clone())),
            app_users: Arc::new(PostgresAppUsers::new(self.pool.clone())),
            spaces: Arc::new(PostgresSpaces::new(self.pool.clone())),
            groups: Arc::new(PostgresGroups::new(self.pool.clone())),
            policies: Arc::new(self.policies()),
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::already_exists(msg),
                Some("23503") => DomainError::not_found(msg),
                _ => DomainError::storage(msg),
            }
        }
        sqlx::Error::RowNotFound => DomainError::not_found(format!("{operation}: no matching row")),
        sqlx::Error::PoolClosed => DomainError::storage(format!("{operation}: connection pool closed")),
        other => DomainError::storage(format!("{operation}: {other}")),
    }
}
