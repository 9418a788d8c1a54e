//! Work item storage implementations.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leasekeep_core::{DomainError, NewWorkItem, StatusCounts, WorkItem, WorkItemId, WorkItemStatus};

use crate::error::StoreError;

/// Work item store abstraction.
///
/// Ids and `created_at`/`updated_at` are the store's responsibility: `insert`
/// assigns the next id and stamps both timestamps with `now`. Status changes go
/// through `save_transition`, a compare-and-set on the previous status.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Insert a new PENDING item created at `now`.
    async fn insert(&self, item: NewWorkItem, now: DateTime<Utc>) -> Result<WorkItem, StoreError>;

    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>, StoreError>;

    /// All items, ordered by id.
    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError>;

    /// Items with `status`, oldest `created_at` first (ties by id).
    async fn list_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>, StoreError>;

    /// Items submitted by `owner_id`, ordered by id.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>, StoreError>;

    /// Persist `item` if the stored row is still in status `expected`.
    ///
    /// Fails with `Conflict` when the row moved on, `NotFound` when it is gone,
    /// and `Domain` when `expected -> item.status` is not a lifecycle edge.
    async fn save_transition(&self, item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError>;

    /// COMPLETED items with `processed_at` strictly before `cutoff`.
    async fn list_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError>;

    /// Delete the given items in one batch, skipping any that are not COMPLETED.
    ///
    /// Returns the number of rows removed.
    async fn delete_completed(&self, ids: &[WorkItemId]) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError>;

    /// PENDING items in processing order.
    async fn list_pending(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.list_by_status(WorkItemStatus::Pending).await
    }
}

#[async_trait]
impl<S> WorkItemStore for Arc<S>
where
    S: WorkItemStore + ?Sized,
{
    async fn insert(&self, item: NewWorkItem, now: DateTime<Utc>) -> Result<WorkItem, StoreError> {
        (**self).insert(item, now).await
    }

    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        (**self).get(id).await
    }

    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
        (**self).list_all().await
    }

    async fn list_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>, StoreError> {
        (**self).list_by_status(status).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        (**self).list_by_owner(owner_id).await
    }

    async fn save_transition(&self, item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError> {
        (**self).save_transition(item, expected).await
    }

    async fn list_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError> {
        (**self).list_completed_before(cutoff).await
    }

    async fn delete_completed(&self, ids: &[WorkItemId]) -> Result<u64, StoreError> {
        (**self).delete_completed(ids).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        (**self).count().await
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        (**self).counts_by_status().await
    }
}

/// Reject writes that would break the lifecycle invariants before touching storage.
pub(crate) fn check_transition(item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError> {
    if !expected.can_transition_to(item.status) {
        return Err(DomainError::invalid_transition(expected, item.status).into());
    }
    if !item.is_consistent() {
        return Err(DomainError::validation(format!(
            "item {} has status {} but processed_at = {:?}",
            item.id, item.status, item.processed_at
        ))
        .into());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<WorkItemId, WorkItem>,
}

/// In-memory work item store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryWorkItemStore {
    table: RwLock<Table>,
}

impl InMemoryWorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn select<F>(&self, filter: F) -> Result<Vec<WorkItem>, StoreError>
    where
        F: Fn(&WorkItem) -> bool,
    {
        let table = self.table.read().map_err(|_| StoreError::poisoned())?;
        Ok(table.rows.values().filter(|i| filter(i)).cloned().collect())
    }
}

#[async_trait]
impl WorkItemStore for InMemoryWorkItemStore {
    async fn insert(&self, item: NewWorkItem, now: DateTime<Utc>) -> Result<WorkItem, StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::poisoned())?;
        table.next_id += 1;
        let id = WorkItemId::new(table.next_id);
        let stored = WorkItem::pending(id, item, now);
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::poisoned())?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.select(|_| true)
    }

    async fn list_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>, StoreError> {
        let mut result = self.select(|i| i.status == status)?;
        result.sort_by_key(|i| (i.created_at, i.id));
        Ok(result)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        self.select(|i| i.owner_id == owner_id)
    }

    async fn save_transition(&self, item: &WorkItem, expected: WorkItemStatus) -> Result<(), StoreError> {
        check_transition(item, expected)?;

        let mut table = self.table.write().map_err(|_| StoreError::poisoned())?;
        let current = table.rows.get_mut(&item.id).ok_or(StoreError::NotFound(item.id))?;
        if current.status != expected {
            return Err(StoreError::Conflict(format!(
                "item {} is {}, expected {}",
                item.id, current.status, expected
            )));
        }

        // Identity and creation time are immutable.
        let mut next = item.clone();
        next.created_at = current.created_at;
        next.owner_id = current.owner_id.clone();
        next.category = current.category.clone();
        *current = next;
        Ok(())
    }

    async fn list_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>, StoreError> {
        self.select(|i| i.is_stale(cutoff))
    }

    async fn delete_completed(&self, ids: &[WorkItemId]) -> Result<u64, StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::poisoned())?;
        let mut removed = 0;
        for id in ids {
            let completed = table
                .rows
                .get(id)
                .is_some_and(|i| i.status == WorkItemStatus::Completed);
            if completed {
                table.rows.remove(id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::poisoned())?;
        Ok(table.rows.len() as u64)
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::poisoned())?;
        Ok(StatusCounts::from_items(table.rows.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_item(owner: &str) -> NewWorkItem {
        NewWorkItem::new(owner, "DAILY_METRICS", "payload").unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_timestamps() {
        let store = InMemoryWorkItemStore::new();
        let now = Utc::now();

        let a = store.insert(new_item("user001"), now).await.unwrap();
        let b = store.insert(new_item("user002"), now).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, WorkItemStatus::Pending);
        assert_eq!(a.created_at, now);
        assert_eq!(a.updated_at, now);
        assert!(a.processed_at.is_none());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pending_list_is_oldest_first() {
        let store = InMemoryWorkItemStore::new();
        let now = Utc::now();

        let late = store.insert(new_item("u"), now).await.unwrap();
        let early = store.insert(new_item("u"), now - Duration::minutes(10)).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn save_transition_is_compare_and_set() {
        let store = InMemoryWorkItemStore::new();
        let mut item = store.insert(new_item("u"), Utc::now()).await.unwrap();

        item.start_processing(Utc::now()).unwrap();
        store.save_transition(&item, WorkItemStatus::Pending).await.unwrap();

        // A second writer that still believes the item is PENDING loses.
        let err = store.save_transition(&item, WorkItemStatus::Pending).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkItemStatus::Processing);
    }

    #[tokio::test]
    async fn save_transition_rejects_illegal_edges() {
        let store = InMemoryWorkItemStore::new();
        let mut item = store.insert(new_item("u"), Utc::now()).await.unwrap();
        item.start_processing(Utc::now()).unwrap();
        store.save_transition(&item, WorkItemStatus::Pending).await.unwrap();
        item.fail(Utc::now()).unwrap();
        store.save_transition(&item, WorkItemStatus::Processing).await.unwrap();

        // FAILED -> PENDING is never allowed.
        let mut revived = item.clone();
        revived.status = WorkItemStatus::Pending;
        let err = store.save_transition(&revived, WorkItemStatus::Failed).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let store = InMemoryWorkItemStore::new();
        let mut ghost = WorkItem::pending(WorkItemId::new(99), new_item("u"), Utc::now());
        ghost.start_processing(Utc::now()).unwrap();

        let err = store.save_transition(&ghost, WorkItemStatus::Pending).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == WorkItemId::new(99)));
    }

    #[tokio::test]
    async fn delete_completed_skips_other_statuses() {
        let store = InMemoryWorkItemStore::new();
        let pending = store.insert(new_item("u"), Utc::now()).await.unwrap();

        assert_eq!(store.delete_completed(&[pending.id]).await.unwrap(), 0);
        assert!(store.get(pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn owner_filter_and_counts() {
        let store = InMemoryWorkItemStore::new();
        store.insert(new_item("user001"), Utc::now()).await.unwrap();
        store.insert(new_item("user001"), Utc::now()).await.unwrap();
        store.insert(new_item("user002"), Utc::now()).await.unwrap();

        assert_eq!(store.list_by_owner("user001").await.unwrap().len(), 2);
        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.pending, 3);
    }
}
