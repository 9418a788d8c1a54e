//! Work items and their status lifecycle.
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED
//!                       \-> FAILED
//! ```
//!
//! Every mutation goes through the transition methods on [`WorkItem`], which
//! keep `processed_at` in lockstep with `COMPLETED` and refuse any other edge.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::WorkItemId;

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 4] = [
        WorkItemStatus::Pending,
        WorkItemStatus::Processing,
        WorkItemStatus::Completed,
        WorkItemStatus::Failed,
    ];

    /// Storage/wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "PENDING",
            WorkItemStatus::Processing => "PROCESSING",
            WorkItemStatus::Completed => "COMPLETED",
            WorkItemStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkItemStatus::Completed | WorkItemStatus::Failed)
    }

    /// Whether the lifecycle has an edge `self -> next`.
    pub fn can_transition_to(&self, next: WorkItemStatus) -> bool {
        matches!(
            (self, next),
            (WorkItemStatus::Pending, WorkItemStatus::Processing)
                | (WorkItemStatus::Processing, WorkItemStatus::Completed)
                | (WorkItemStatus::Processing, WorkItemStatus::Failed)
        )
    }
}

impl core::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = DomainError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WorkItemStatus::Pending),
            "PROCESSING" => Ok(WorkItemStatus::Processing),
            "COMPLETED" => Ok(WorkItemStatus::Completed),
            "FAILED" => Ok(WorkItemStatus::Failed),
            _ => Err(DomainError::UnknownStatus(s.to_string())),
        }
    }
}

/// Input for creating a work item; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub owner_id: String,
    pub category: String,
    pub payload: String,
}

impl NewWorkItem {
    pub fn new(
        owner_id: impl Into<String>,
        category: impl Into<String>,
        payload: impl Into<String>,
    ) -> DomainResult<Self> {
        let item = Self {
            owner_id: owner_id.into(),
            category: category.into(),
            payload: payload.into(),
        };
        if item.owner_id.trim().is_empty() {
            return Err(DomainError::validation("owner_id must not be empty"));
        }
        if item.category.trim().is_empty() {
            return Err(DomainError::validation("category must not be empty"));
        }
        Ok(item)
    }
}

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub owner_id: String,
    pub category: String,
    pub payload: String,
    pub status: WorkItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Materialize a freshly inserted item. Stores call this with the id they assigned.
    pub fn pending(id: WorkItemId, new: NewWorkItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: new.owner_id,
            category: new.category,
            payload: new.payload,
            status: WorkItemStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    fn transition(&mut self, next: WorkItemStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING -> PROCESSING.
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(WorkItemStatus::Processing, now)
    }

    /// PROCESSING -> COMPLETED, replacing the payload with the processed content.
    pub fn complete(&mut self, payload: String, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(WorkItemStatus::Completed, now)?;
        self.payload = payload;
        self.processed_at = Some(now);
        Ok(())
    }

    /// PROCESSING -> FAILED. Terminal: there is no way back to PENDING.
    pub fn fail(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(WorkItemStatus::Failed, now)
    }

    /// `processed_at` is set iff the item is COMPLETED.
    pub fn is_consistent(&self) -> bool {
        (self.status == WorkItemStatus::Completed) == self.processed_at.is_some()
    }

    /// COMPLETED and processed strictly before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == WorkItemStatus::Completed
            && self.processed_at.is_some_and(|at| at < cutoff)
    }
}

/// Aggregate counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: WorkItemStatus, n: u64) {
        self.total += n;
        match status {
            WorkItemStatus::Pending => self.pending += n,
            WorkItemStatus::Processing => self.processing += n,
            WorkItemStatus::Completed => self.completed += n,
            WorkItemStatus::Failed => self.failed += n,
        }
    }

    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            counts.record(item.status, 1);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item() -> WorkItem {
        let new = NewWorkItem::new("user001", "MONTHLY_SALES", "data").unwrap();
        WorkItem::pending(WorkItemId::new(1), new, Utc::now())
    }

    #[test]
    fn happy_path_sets_processed_at() {
        let mut it = item();
        assert!(it.is_consistent());

        it.start_processing(Utc::now()).unwrap();
        assert_eq!(it.status, WorkItemStatus::Processing);
        assert!(it.processed_at.is_none());

        let done = Utc::now();
        it.complete("Processed: data".to_string(), done).unwrap();
        assert_eq!(it.status, WorkItemStatus::Completed);
        assert_eq!(it.processed_at, Some(done));
        assert_eq!(it.payload, "Processed: data");
        assert!(it.is_consistent());
    }

    #[test]
    fn failure_is_terminal() {
        let mut it = item();
        it.start_processing(Utc::now()).unwrap();
        it.fail(Utc::now()).unwrap();

        assert!(it.status.is_terminal());
        assert!(it.processed_at.is_none());
        assert!(matches!(
            it.start_processing(Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(it.complete("x".into(), Utc::now()).is_err());
    }

    #[test]
    fn cannot_skip_processing() {
        let mut it = item();
        let err = it.complete("x".into(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::invalid_transition(WorkItemStatus::Pending, WorkItemStatus::Completed)
        );
        assert_eq!(it.status, WorkItemStatus::Pending);
        assert!(it.fail(Utc::now()).is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("pending".parse::<WorkItemStatus>().unwrap(), WorkItemStatus::Pending);
        assert_eq!("Completed".parse::<WorkItemStatus>().unwrap(), WorkItemStatus::Completed);
        assert!("done".parse::<WorkItemStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_upper_case_label() {
        let json = serde_json::to_string(&WorkItemStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn staleness_requires_completion() {
        let now = Utc::now();
        let mut it = item();
        assert!(!it.is_stale(now + Duration::hours(5)));

        it.start_processing(now - Duration::hours(2)).unwrap();
        it.complete("p".into(), now - Duration::hours(2)).unwrap();
        assert!(it.is_stale(now - Duration::hours(1)));
        assert!(!it.is_stale(now - Duration::hours(3)));
    }

    #[test]
    fn counts_by_status() {
        let mut a = item();
        let b = item();
        a.start_processing(Utc::now()).unwrap();

        let counts = StatusCounts::from_items([&a, &b]);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
    }

    #[test]
    fn new_item_requires_owner_and_category() {
        assert!(NewWorkItem::new("", "X", "p").is_err());
        assert!(NewWorkItem::new("u", " ", "p").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn status_strategy() -> impl Strategy<Value = WorkItemStatus> {
            prop::sample::select(WorkItemStatus::ALL.to_vec())
        }

        fn rank(s: WorkItemStatus) -> u8 {
            match s {
                WorkItemStatus::Pending => 0,
                WorkItemStatus::Processing => 1,
                WorkItemStatus::Completed | WorkItemStatus::Failed => 2,
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: whatever sequence of transitions is attempted, the observed
            /// status only moves forward and `processed_at` tracks COMPLETED.
            #[test]
            fn transitions_are_monotonic(targets in prop::collection::vec(status_strategy(), 0..12)) {
                let mut it = item();
                let mut observed = vec![it.status];

                for target in targets {
                    let now = Utc::now();
                    let _ = match target {
                        WorkItemStatus::Pending => Err(DomainError::invalid_transition(it.status, target)),
                        WorkItemStatus::Processing => it.start_processing(now),
                        WorkItemStatus::Completed => it.complete("done".into(), now),
                        WorkItemStatus::Failed => it.fail(now),
                    };
                    prop_assert!(it.is_consistent());
                    observed.push(it.status);
                }

                for pair in observed.windows(2) {
                    prop_assert!(rank(pair[0]) <= rank(pair[1]));
                    if pair[0].is_terminal() {
                        prop_assert_eq!(pair[0], pair[1]);
                    }
                }
            }
        }
    }
}
