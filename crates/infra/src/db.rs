//! Database wiring: connection pool, schema, and SQLx error mapping.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Conflict` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / other | N/A | `Storage` |

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::StoreError;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Open a connection pool against `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    info!(max_connections, "database pool ready");
    Ok(pool)
}

/// Create the `leases` and `work_items` tables if they are missing.
///
/// Idempotent; every instance runs it at startup.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Pool for tests that exercise the SQL itself.
///
/// Returns `None` when `DATABASE_URL` is unset so those tests pass vacuously
/// on machines without Postgres. The schema is applied once per test binary.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    static SCHEMA_APPLIED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

    let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty())?;
    let pool = connect(&url, 16).await.expect("DATABASE_URL is set but unreachable");
    SCHEMA_APPLIED
        .get_or_init(|| async {
            apply_schema(&pool).await.expect("failed to apply schema");
        })
        .await;
    Some(pool)
}
