//! Acquire/hold/release protocol on top of a [`LeaseStore`].

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use leasekeep_core::{Lease, LeasePolicy, OwnerToken};

use crate::error::StoreError;

use super::store::LeaseStore;

/// Why an acquisition did not produce a lease.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LeaseError {
    /// Another owner holds an unexpired lease. Expected under contention; the
    /// caller skips its tick instead of retrying.
    #[error("lease '{job_name}' is held until {valid_until:?} by {holder:?}")]
    Held {
        job_name: String,
        holder: Option<OwnerToken>,
        valid_until: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-instance lease manager.
///
/// Every lease this manager writes carries its `owner` token; two managers
/// sharing a token are indistinguishable to the store.
#[derive(Debug, Clone)]
pub struct LeaseManager<S> {
    store: S,
    owner: OwnerToken,
}

impl<S: LeaseStore> LeaseManager<S> {
    pub fn new(store: S, owner: OwnerToken) -> Self {
        Self { store, owner }
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Acquire `job_name` at `now`, or extend it if this manager already holds it.
    ///
    /// The returned record expires at `now + policy.max_hold`.
    pub async fn acquire(
        &self,
        job_name: &str,
        policy: &LeasePolicy,
        now: DateTime<Utc>,
    ) -> Result<Lease, LeaseError> {
        let candidate = Lease::granted(job_name, self.owner.clone(), policy, now);

        match self.store.try_acquire(&candidate).await? {
            Some(lease) => {
                debug!(job = job_name, owner = %self.owner, valid_until = %lease.valid_until, "lease acquired");
                Ok(lease)
            }
            None => {
                // Best-effort lookup for the log line; the acquisition already failed.
                let current = self.store.get(job_name).await.ok().flatten();
                Err(LeaseError::Held {
                    job_name: job_name.to_string(),
                    holder: current.as_ref().map(|l| l.owner_token.clone()),
                    valid_until: current.map(|l| l.valid_until),
                })
            }
        }
    }

    /// `true` when this instance now holds `job_name`, `false` under contention.
    pub async fn try_acquire_or_extend(
        &self,
        job_name: &str,
        policy: &LeasePolicy,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.acquire(job_name, policy, now).await {
            Ok(_) => Ok(true),
            Err(LeaseError::Held { .. }) => Ok(false),
            Err(LeaseError::Store(e)) => Err(e),
        }
    }

    /// Give the lease back at `now`.
    ///
    /// The hold still lasts until `acquired_at + min_hold`; releasing earlier
    /// only moves `valid_until` to that floor. Returns the effective expiry, or
    /// `None` if the hold had already been taken over by someone else.
    pub async fn release(
        &self,
        lease: &Lease,
        policy: &LeasePolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let release_at = lease.release_deadline(policy, now);
        let released = self
            .store
            .release(&lease.job_name, &self.owner, lease.acquired_at, release_at)
            .await?;

        if released {
            debug!(job = %lease.job_name, owner = %self.owner, %release_at, "lease released");
            Ok(Some(release_at))
        } else {
            warn!(job = %lease.job_name, owner = %self.owner, "lease was lost before release");
            Ok(None)
        }
    }
}
