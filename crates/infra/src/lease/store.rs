//! Lease storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leasekeep_core::{Lease, OwnerToken};

use crate::error::StoreError;

/// Durable table of lease records keyed by job name.
///
/// ## Implementation Requirements
///
/// - `try_acquire` must be a single atomic conditional write: insert when no
///   record exists, overwrite when the stored record is expired at
///   `candidate.acquired_at` or belongs to `candidate.owner_token`, otherwise
///   leave the record untouched. Never read-then-write.
/// - `release` only touches the hold identified by `(owner, acquired_at)` and
///   may only shorten `valid_until`.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Write `candidate` if the current record admits it.
    ///
    /// Returns the record as stored on success, `None` when another owner holds
    /// an unexpired lease.
    async fn try_acquire(&self, candidate: &Lease) -> Result<Option<Lease>, StoreError>;

    /// Lower `valid_until` to `release_at` for the given hold.
    ///
    /// Returns `false` when the hold no longer exists (expired and taken over).
    async fn release(
        &self,
        job_name: &str,
        owner: &OwnerToken,
        acquired_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get(&self, job_name: &str) -> Result<Option<Lease>, StoreError>;

    /// All lease records, ordered by job name.
    async fn list(&self) -> Result<Vec<Lease>, StoreError>;
}

#[async_trait]
impl<S> LeaseStore for Arc<S>
where
    S: LeaseStore + ?Sized,
{
    async fn try_acquire(&self, candidate: &Lease) -> Result<Option<Lease>, StoreError> {
        (**self).try_acquire(candidate).await
    }

    async fn release(
        &self,
        job_name: &str,
        owner: &OwnerToken,
        acquired_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).release(job_name, owner, acquired_at, release_at).await
    }

    async fn get(&self, job_name: &str) -> Result<Option<Lease>, StoreError> {
        (**self).get(job_name).await
    }

    async fn list(&self) -> Result<Vec<Lease>, StoreError> {
        (**self).list().await
    }
}

/// In-memory lease store for tests/dev.
///
/// Shared between "instances" by cloning the `Arc`; the single write lock
/// makes every acquisition atomic.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: RwLock<HashMap<String, Lease>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(&self, candidate: &Lease) -> Result<Option<Lease>, StoreError> {
        let mut leases = self.leases.write().map_err(|_| StoreError::poisoned())?;

        if let Some(current) = leases.get(&candidate.job_name) {
            if !current.admits(&candidate.owner_token, candidate.acquired_at) {
                return Ok(None);
            }
        }

        leases.insert(candidate.job_name.clone(), candidate.clone());
        Ok(Some(candidate.clone()))
    }

    async fn release(
        &self,
        job_name: &str,
        owner: &OwnerToken,
        acquired_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut leases = self.leases.write().map_err(|_| StoreError::poisoned())?;

        match leases.get_mut(job_name) {
            Some(lease) if &lease.owner_token == owner && lease.acquired_at == acquired_at => {
                lease.valid_until = lease.valid_until.min(release_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, job_name: &str) -> Result<Option<Lease>, StoreError> {
        let leases = self.leases.read().map_err(|_| StoreError::poisoned())?;
        Ok(leases.get(job_name).cloned())
    }

    async fn list(&self) -> Result<Vec<Lease>, StoreError> {
        let leases = self.leases.read().map_err(|_| StoreError::poisoned())?;
        let mut result: Vec<_> = leases.values().cloned().collect();
        result.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        Ok(result)
    }
}
