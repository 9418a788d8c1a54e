//! Deletes COMPLETED items past the retention window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use leasekeep_core::WorkItemId;

use crate::scheduler::{JobBody, JobError, JobReport};
use crate::work_items::WorkItemStore;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

pub struct CleanupStaleJob<S> {
    store: S,
    retention: Duration,
}

impl<S: WorkItemStore + 'static> CleanupStaleJob<S> {
    pub fn new(store: S, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// `now - retention`, clamped to the earliest representable instant.
    ///
    /// A retention longer than the calendar range selects nothing.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
impl<S: WorkItemStore + 'static> JobBody for CleanupStaleJob<S> {
    async fn run(&self, started_at: DateTime<Utc>) -> Result<JobReport, JobError> {
        let cutoff = self.cutoff(started_at);
        let stale = self.store.list_completed_before(cutoff).await?;
        if stale.is_empty() {
            return Ok(JobReport::default());
        }

        let ids: Vec<WorkItemId> = stale.iter().map(|i| i.id).collect();
        let deleted = self.store.delete_completed(&ids).await?;
        info!(deleted, %cutoff, "stale work items removed");
        Ok(JobReport::affected(deleted))
    }
}
