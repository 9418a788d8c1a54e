use std::sync::Arc;

use leasekeep_infra::config::AppConfig;
use leasekeep_infra::db;
use leasekeep_infra::lease::{InMemoryLeaseStore, LeaseStore, PostgresLeaseStore};
use leasekeep_infra::work_items::{InMemoryWorkItemStore, PostgresWorkItemStore, WorkItemStore};
use leasekeep_infra::StoreError;

/// Stores shared by the HTTP handlers and the scheduler.
#[derive(Clone)]
pub struct AppServices {
    pub work_items: Arc<dyn WorkItemStore>,
    pub leases: Arc<dyn LeaseStore>,
}

impl AppServices {
    pub fn in_memory() -> Self {
        Self {
            work_items: InMemoryWorkItemStore::arc(),
            leases: InMemoryLeaseStore::arc(),
        }
    }
}

/// Postgres when `DATABASE_URL` is configured (schema applied on startup),
/// in-memory otherwise. In-memory stores only coordinate within this process.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory stores (no cross-instance exclusivity)");
        return Ok(AppServices::in_memory());
    };

    let pool = db::connect(url, config.db_max_connections).await?;
    db::apply_schema(&pool).await?;

    Ok(AppServices {
        work_items: Arc::new(PostgresWorkItemStore::new(pool.clone())),
        leases: Arc::new(PostgresLeaseStore::new(pool)),
    })
}
