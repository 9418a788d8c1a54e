//! Postgres-backed work item store.
//!
//! ## Atomicity
//!
//! Every write is a single statement. Status changes are guarded with
//! `WHERE id = $1 AND status = $expected`, so a writer working from a stale
//! snapshot updates zero rows and gets `StoreError::Conflict` instead of
//! clobbering a newer state. The table's check constraint additionally ties
//! `processed_at` to `COMPLETED` at the database level.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use leasekeep_core::{NewWorkItem, StatusCounts, WorkItem, WorkItemId, WorkItemStatus};

use crate::db::map_sqlx_error;
use crate::error::StoreError;

use super::store::{check_transition, WorkItemStore};

const COLUMNS: &str =
    "id, owner_id, category, payload, status, created_at, updated_at, processed_at";

#[derive(Debug, Clone)]
pub struct PostgresWorkItemStore {
    pool: Arc<PgPool>,
}

impl PostgresWorkItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_many(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(|r| item_from_row(r, operation)).collect()
    }
}

#[async_trait]
impl WorkItemStore for PostgresWorkItemStore {
    #[instrument(skip(self, item), fields(owner_id = %item.owner_id, category = %item.category), err)]
    async fn insert(&self, item: NewWorkItem, now: DateTime<Utc>) -> Result<WorkItem, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO work_items (owner_id, category, payload, status, created_at, updated_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $5, NULL)
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&item.owner_id)
            .bind(&item.category)
            .bind(&item.payload)
            .bind(WorkItemStatus::Pending.as_str())
            .bind(now)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;

        item_from_row(&row, "insert")
    }

    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM work_items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| item_from_row(&r, "get")).transpose()
    }

    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM work_items ORDER BY id ASC");
        self.fetch_many("list_all", sqlx::query(&sql)).await
    }

    async fn list_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM work_items WHERE status = $1 ORDER BY created_at ASC, id ASC"
        );
        self.fetch_many("list_by_status", sqlx::query(&sql).bind(status.as_str()))
            .await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM work_items WHERE owner_id = $1 ORDER BY id ASC");
        self.fetch_many("list_by_owner", sqlx::query(&sql).bind(owner_id))
            .await
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, to = %item.status), err)]
    async fn save_transition(&self, item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError> {
        check_transition(item, expected)?;

        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET payload = $3, status = $4, updated_at = $5, processed_at = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(item.id.get())
        .bind(expected.as_str())
        .bind(&item.payload)
        .bind(item.status.as_str())
        .bind(item.updated_at)
        .bind(item.processed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_transition", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Zero rows: either the item is gone or it is no longer in `expected`.
        match self.get(item.id).await? {
            None => Err(StoreError::NotFound(item.id)),
            Some(current) => Err(StoreError::Conflict(format!(
                "item {} is {}, expected {}",
                item.id, current.status, expected
            ))),
        }
    }

    async fn list_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM work_items
            WHERE status = 'COMPLETED' AND processed_at IS NOT NULL AND processed_at < $1
            ORDER BY processed_at ASC, id ASC
            "#
        );
        self.fetch_many("list_completed_before", sqlx::query(&sql).bind(cutoff))
            .await
    }

    #[instrument(skip(self, ids), fields(batch = ids.len()), err)]
    async fn delete_completed(&self, ids: &[WorkItemId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let result = sqlx::query(
            r#"
            DELETE FROM work_items
            WHERE id = ANY($1) AND status = 'COMPLETED'
            "#,
        )
        .bind(raw)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_completed", e))?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_items")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(n as u64)
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM work_items GROUP BY status")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("counts_by_status", e))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| map_sqlx_error("counts_by_status", e))?;
            let n: i64 = row
                .try_get("n")
                .map_err(|e| map_sqlx_error("counts_by_status", e))?;
            counts.record(status.parse()?, n as u64);
        }
        Ok(counts)
    }
}

fn item_from_row(row: &PgRow, operation: &str) -> Result<WorkItem, StoreError> {
    let row = WorkItemRow::from_row(row).map_err(|e| map_sqlx_error(operation, e))?;
    row.try_into()
}

struct WorkItemRow {
    id: i64,
    owner_id: String,
    category: String,
    payload: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for WorkItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(WorkItemRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            category: row.try_get("category")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = StoreError;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        Ok(WorkItem {
            id: WorkItemId::new(row.id),
            owner_id: row.owner_id,
            category: row.category,
            payload: row.payload,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            processed_at: row.processed_at,
        })
    }
}
