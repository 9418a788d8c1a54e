//! Drains PENDING items through the processor.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use leasekeep_core::{WorkItem, WorkItemStatus};

use crate::error::StoreError;
use crate::scheduler::{JobBody, JobError, JobReport};
use crate::work_items::WorkItemStore;

use super::processor::ItemProcessor;

/// Processes the PENDING snapshot taken at the start of the tick, oldest first.
///
/// Items are handled one at a time. An item whose PENDING -> PROCESSING write
/// loses its compare-and-set was claimed elsewhere and is skipped. Once claimed,
/// an item whose completion cannot be stored is marked FAILED instead, so it
/// never stays in PROCESSING. Any other store failure aborts the tick; items
/// already moved keep their new status.
pub struct IngestPendingJob<S, P> {
    store: S,
    processor: P,
}

impl<S, P> IngestPendingJob<S, P>
where
    S: WorkItemStore + 'static,
    P: ItemProcessor,
{
    pub fn new(store: S, processor: P) -> Self {
        Self { store, processor }
    }

    /// Run the PROCESSING -> terminal half for one claimed item.
    ///
    /// A claimed item always ends COMPLETED or FAILED unless the store refuses
    /// both writes; in that case the error aborts the tick.
    async fn finish(&self, item: WorkItem, report: &mut JobReport) -> Result<(), StoreError> {
        let reason = match self.processor.process(&item).await {
            Ok(processed) => {
                let now = Utc::now();
                let payload = format!(
                    "{processed} | Processed at: {}",
                    now.to_rfc3339_opts(SecondsFormat::Millis, true)
                );
                let mut completed = item.clone();
                completed.complete(payload, now)?;
                match self.store.save_transition(&completed, WorkItemStatus::Processing).await {
                    Ok(()) => {
                        report.affected += 1;
                        info!(item_id = %item.id, "work item completed");
                        return Ok(());
                    }
                    Err(StoreError::Conflict(reason)) => {
                        warn!(item_id = %item.id, %reason, "item changed while processing; leaving it");
                        return Ok(());
                    }
                    Err(StoreError::NotFound(id)) => {
                        warn!(item_id = %id, "item vanished while processing");
                        return Ok(());
                    }
                    Err(e) => format!("could not record completion: {e}"),
                }
            }
            Err(e) => e.to_string(),
        };

        let mut failed = item;
        failed.fail(Utc::now())?;
        self.store.save_transition(&failed, WorkItemStatus::Processing).await?;
        report.failed += 1;
        warn!(item_id = %failed.id, %reason, "work item failed");
        Ok(())
    }
}

#[async_trait]
impl<S, P> JobBody for IngestPendingJob<S, P>
where
    S: WorkItemStore + 'static,
    P: ItemProcessor,
{
    async fn run(&self, _started_at: DateTime<Utc>) -> Result<JobReport, JobError> {
        let pending = self.store.list_pending().await?;
        if pending.is_empty() {
            return Ok(JobReport::default());
        }

        info!(count = pending.len(), "processing pending work items");
        let mut report = JobReport::default();

        for mut item in pending {
            item.start_processing(Utc::now())?;
            match self.store.save_transition(&item, WorkItemStatus::Pending).await {
                Ok(()) => {}
                Err(StoreError::Conflict(reason)) => {
                    warn!(item_id = %item.id, %reason, "item claimed elsewhere; skipping");
                    continue;
                }
                Err(StoreError::NotFound(id)) => {
                    warn!(item_id = %id, "item vanished before processing; skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            self.finish(item, &mut report).await?;
        }

        info!(completed = report.affected, failed = report.failed, "pending work items processed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use std::sync::atomic::{AtomicU32, Ordering};

    use leasekeep_core::{NewWorkItem, StatusCounts, WorkItemId};

    use super::*;
    use crate::jobs::processor::{ProcessingError, SimulatedProcessor};
    use crate::work_items::InMemoryWorkItemStore;

    struct FailingProcessor;

    #[async_trait]
    impl ItemProcessor for FailingProcessor {
        async fn process(&self, _item: &WorkItem) -> Result<String, ProcessingError> {
            Err(ProcessingError::new("upstream unavailable"))
        }
    }

    async fn seed(store: &Arc<InMemoryWorkItemStore>, payloads: &[&str]) -> Vec<WorkItem> {
        let base = Utc::now() - ChronoDuration::minutes(10);
        let mut items = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let new = NewWorkItem::new(format!("user00{}", i + 1), "DAILY_METRICS", *payload).unwrap();
            items.push(store.insert(new, base + ChronoDuration::seconds(i as i64)).await.unwrap());
        }
        items
    }

    #[tokio::test]
    async fn completes_pending_items_in_creation_order() {
        let store = InMemoryWorkItemStore::arc();
        let seeded = seed(&store, &["a", "b", "c"]).await;
        let job = IngestPendingJob::new(store.clone(), SimulatedProcessor::new(Duration::from_millis(2)));

        let report = job.run(Utc::now()).await.unwrap();
        assert_eq!(report, JobReport { affected: 3, failed: 0 });

        let mut processed = Vec::new();
        for (original, payload) in seeded.iter().zip(["a", "b", "c"]) {
            let item = store.get(original.id).await.unwrap().unwrap();
            assert_eq!(item.status, WorkItemStatus::Completed);
            assert!(item.payload.starts_with(&format!("Processed: {payload} | Processed at: ")));
            assert!(item.is_consistent());
            processed.push(item.processed_at.unwrap());
        }
        assert!(processed[0] < processed[1] && processed[1] < processed[2]);
    }

    #[tokio::test]
    async fn processing_failure_marks_item_failed() {
        let store = InMemoryWorkItemStore::arc();
        let seeded = seed(&store, &["x"]).await;
        let job = IngestPendingJob::new(store.clone(), FailingProcessor);

        let report = job.run(Utc::now()).await.unwrap();
        assert_eq!(report, JobReport { affected: 0, failed: 1 });

        let item = store.get(seeded[0].id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Failed);
        assert_eq!(item.payload, "x");
        assert!(item.processed_at.is_none());

        // FAILED items are not picked up again.
        assert_eq!(job.run(Utc::now()).await.unwrap(), JobReport::default());
    }

    #[tokio::test]
    async fn empty_backlog_is_a_no_op() {
        let store = InMemoryWorkItemStore::arc();
        let job = IngestPendingJob::new(store.clone(), SimulatedProcessor::new(Duration::ZERO));

        assert_eq!(job.run(Utc::now()).await.unwrap(), JobReport::default());
        assert_eq!(job.run(Utc::now()).await.unwrap(), JobReport::default());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn items_claimed_elsewhere_are_left_alone() {
        let store = InMemoryWorkItemStore::arc();
        let seeded = seed(&store, &["a", "b"]).await;

        // Another instance already moved the first item to PROCESSING.
        let mut claimed = seeded[0].clone();
        claimed.start_processing(Utc::now()).unwrap();
        store.save_transition(&claimed, WorkItemStatus::Pending).await.unwrap();

        let job = IngestPendingJob::new(store.clone(), SimulatedProcessor::new(Duration::ZERO));
        let report = job.run(Utc::now()).await.unwrap();
        assert_eq!(report.affected, 1);

        let first = store.get(seeded[0].id).await.unwrap().unwrap();
        assert_eq!(first.status, WorkItemStatus::Processing);
        let second = store.get(seeded[1].id).await.unwrap().unwrap();
        assert_eq!(second.status, WorkItemStatus::Completed);
    }

    /// Delegates to an in-memory store but rejects the first `n` COMPLETED writes.
    struct RejectCompletions {
        inner: Arc<InMemoryWorkItemStore>,
        remaining: AtomicU32,
    }

    #[async_trait]
    impl WorkItemStore for RejectCompletions {
        async fn insert(&self, item: NewWorkItem, now: DateTime<Utc>) -> Result<WorkItem, StoreError> {
            self.inner.insert(item, now).await
        }

        async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>, StoreError> {
            self.inner.get(id).await
        }

        async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
            self.inner.list_all().await
        }

        async fn list_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>, StoreError> {
            self.inner.list_by_status(status).await
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>, StoreError> {
            self.inner.list_by_owner(owner_id).await
        }

        async fn save_transition(&self, item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError> {
            if item.status == WorkItemStatus::Completed
                && self
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::storage("connection reset"));
            }
            self.inner.save_transition(item, expected).await
        }

        async fn list_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError> {
            self.inner.list_completed_before(cutoff).await
        }

        async fn delete_completed(&self, ids: &[WorkItemId]) -> Result<u64, StoreError> {
            self.inner.delete_completed(ids).await
        }

        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }

        async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
            self.inner.counts_by_status().await
        }
    }

    #[tokio::test]
    async fn unrecorded_completion_marks_item_failed_and_moves_on() {
        let inner = InMemoryWorkItemStore::arc();
        let seeded = seed(&inner, &["a", "b"]).await;
        let store = Arc::new(RejectCompletions {
            inner: inner.clone(),
            remaining: AtomicU32::new(1),
        });
        let job = IngestPendingJob::new(store, SimulatedProcessor::new(Duration::ZERO));

        let report = job.run(Utc::now()).await.unwrap();
        assert_eq!(report, JobReport { affected: 1, failed: 1 });

        let first = inner.get(seeded[0].id).await.unwrap().unwrap();
        assert_eq!(first.status, WorkItemStatus::Failed);
        assert_eq!(first.payload, "a");
        assert!(first.processed_at.is_none());

        let second = inner.get(seeded[1].id).await.unwrap().unwrap();
        assert_eq!(second.status, WorkItemStatus::Completed);

        let counts = inner.counts_by_status().await.unwrap();
        assert_eq!(counts.processing, 0);
    }
}
