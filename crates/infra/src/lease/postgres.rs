//! Postgres-backed lease store.
//!
//! Acquisition is one `INSERT … ON CONFLICT DO UPDATE … WHERE` statement: the
//! row is only overwritten when the stored hold has expired or belongs to the
//! requester, and `RETURNING` tells the caller whether the write happened.
//! Two instances racing for the same job name are serialized by the row lock
//! Postgres takes on conflict, so exactly one of them sees a returned row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use leasekeep_core::{Lease, OwnerToken};

use crate::db::map_sqlx_error;
use crate::error::StoreError;

use super::store::LeaseStore;

#[derive(Debug, Clone)]
pub struct PostgresLeaseStore {
    pool: Arc<PgPool>,
}

impl PostgresLeaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LeaseStore for PostgresLeaseStore {
    #[instrument(skip(self, candidate), fields(job = %candidate.job_name, owner = %candidate.owner_token), err)]
    async fn try_acquire(&self, candidate: &Lease) -> Result<Option<Lease>, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO leases (job_name, owner_token, acquired_at, valid_until)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_name) DO UPDATE
            SET
                owner_token = EXCLUDED.owner_token,
                acquired_at = EXCLUDED.acquired_at,
                valid_until = EXCLUDED.valid_until
            WHERE leases.valid_until <= EXCLUDED.acquired_at
               OR leases.owner_token = EXCLUDED.owner_token
            RETURNING job_name, owner_token, acquired_at, valid_until
            "#,
        )
        .bind(&candidate.job_name)
        .bind(candidate.owner_token.as_str())
        .bind(candidate.acquired_at)
        .bind(candidate.valid_until)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("try_acquire", e))?;

        row.map(|r| lease_from_row(&r, "try_acquire")).transpose()
    }

    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    async fn release(
        &self,
        job_name: &str,
        owner: &OwnerToken,
        acquired_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE leases
            SET valid_until = LEAST(valid_until, $4)
            WHERE job_name = $1 AND owner_token = $2 AND acquired_at = $3
            "#,
        )
        .bind(job_name)
        .bind(owner.as_str())
        .bind(acquired_at)
        .bind(release_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, job_name: &str) -> Result<Option<Lease>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_name, owner_token, acquired_at, valid_until
            FROM leases
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_lease", e))?;

        row.map(|r| lease_from_row(&r, "get_lease")).transpose()
    }

    async fn list(&self) -> Result<Vec<Lease>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_name, owner_token, acquired_at, valid_until
            FROM leases
            ORDER BY job_name ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_leases", e))?;

        rows.iter().map(|r| lease_from_row(r, "list_leases")).collect()
    }
}

fn lease_from_row(row: &PgRow, operation: &str) -> Result<Lease, StoreError> {
    let row = LeaseRow::from_row(row).map_err(|e| map_sqlx_error(operation, e))?;
    row.try_into()
}

struct LeaseRow {
    job_name: String,
    owner_token: String,
    acquired_at: DateTime<Utc>,
    valid_until: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for LeaseRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LeaseRow {
            job_name: row.try_get("job_name")?,
            owner_token: row.try_get("owner_token")?,
            acquired_at: row.try_get("acquired_at")?,
            valid_until: row.try_get("valid_until")?,
        })
    }
}

impl TryFrom<LeaseRow> for Lease {
    type Error = StoreError;

    fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
        Ok(Lease {
            job_name: row.job_name,
            owner_token: OwnerToken::new(row.owner_token)?,
            acquired_at: row.acquired_at,
            valid_until: row.valid_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use leasekeep_core::LeasePolicy;

    use super::*;
    use crate::db::test_pool;
    use crate::lease::LeaseManager;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn job_name() -> String {
        format!("pg-test-{}", Uuid::now_v7().simple())
    }

    fn manager(store: &PostgresLeaseStore, owner: &str) -> LeaseManager<PostgresLeaseStore> {
        LeaseManager::new(store.clone(), OwnerToken::new(owner).unwrap())
    }

    #[tokio::test]
    async fn concurrent_acquire_has_one_winner() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresLeaseStore::new(pool);
        let job = job_name();
        let policy = LeasePolicy::from_secs(5, 25).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let candidate = Lease::granted(job.clone(), OwnerToken::new(format!("node-{i}")).unwrap(), &policy, t0());
            handles.push(tokio::spawn(async move { store.try_acquire(&candidate).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn early_release_holds_until_min_hold() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresLeaseStore::new(pool);
        let job = job_name();
        let policy = LeasePolicy::from_secs(5, 25).unwrap();
        let (a, b) = (manager(&store, "node-a"), manager(&store, "node-b"));

        let lease = a.acquire(&job, &policy, t0()).await.unwrap();
        assert_eq!(a.release(&lease, &policy, at(1)).await.unwrap(), Some(at(5)));

        assert!(!b.try_acquire_or_extend(&job, &policy, at(3)).await.unwrap());
        assert!(b.try_acquire_or_extend(&job, &policy, at(5)).await.unwrap());
        assert_eq!(store.get(&job).await.unwrap().unwrap().owner_token.as_str(), "node-b");
    }

    #[tokio::test]
    async fn crashed_holder_is_taken_over_at_max_hold() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresLeaseStore::new(pool);
        let job = job_name();
        let policy = LeasePolicy::from_secs(5, 25).unwrap();
        let (a, b) = (manager(&store, "node-a"), manager(&store, "node-b"));

        let stale = a.acquire(&job, &policy, t0()).await.unwrap();
        assert!(!b.try_acquire_or_extend(&job, &policy, at(24)).await.unwrap());
        assert!(b.try_acquire_or_extend(&job, &policy, at(25)).await.unwrap());

        // The late release of the old hold must not touch the new one.
        assert_eq!(a.release(&stale, &policy, at(26)).await.unwrap(), None);
        let current = store.get(&job).await.unwrap().unwrap();
        assert_eq!(current.owner_token.as_str(), "node-b");
        assert_eq!(current.valid_until, at(50));
    }

    #[tokio::test]
    async fn holder_extends_its_own_lease() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresLeaseStore::new(pool);
        let job = job_name();
        let policy = LeasePolicy::from_secs(5, 25).unwrap();
        let a = manager(&store, "node-a");

        a.acquire(&job, &policy, t0()).await.unwrap();
        let extended = a.acquire(&job, &policy, at(10)).await.unwrap();
        assert_eq!(extended.acquired_at, at(10));
        assert_eq!(extended.valid_until, at(35));
    }
}
