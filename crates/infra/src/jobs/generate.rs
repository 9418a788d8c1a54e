//! Inserts a synthetic PENDING item each tick.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;
use uuid::Uuid;

use leasekeep_core::NewWorkItem;

use crate::scheduler::{JobBody, JobError, JobReport};
use crate::work_items::WorkItemStore;

pub const SAMPLE_CATEGORY: &str = "SAMPLE_REPORT";

pub struct GenerateSampleJob<S> {
    store: S,
}

impl<S: WorkItemStore + 'static> GenerateSampleJob<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: WorkItemStore + 'static> JobBody for GenerateSampleJob<S> {
    async fn run(&self, started_at: DateTime<Utc>) -> Result<JobReport, JobError> {
        let owner_id = format!("user_{}", Uuid::now_v7().simple());
        let payload = format!(
            "Sample report data generated at: {}",
            started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let item = NewWorkItem::new(owner_id, SAMPLE_CATEGORY, payload)?;

        let stored = self.store.insert(item, Utc::now()).await?;
        info!(item_id = %stored.id, owner_id = %stored.owner_id, "sample work item generated");
        Ok(JobReport::affected(1))
    }
}
