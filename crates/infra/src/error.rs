//! Storage error shared by the lease and work item stores.

use leasekeep_core::{DomainError, WorkItemId};

/// Store operation error.
///
/// These are **infrastructure errors** (availability, constraint violations,
/// lost compare-and-set races). A job that hits one aborts its current tick and
/// tries again on its next natural interval.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("work item not found: {0}")]
    NotFound(WorkItemId),

    /// A conditional write found the row in a different state than expected.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub(crate) fn poisoned() -> Self {
        Self::Storage("lock poisoned".to_string())
    }
}
