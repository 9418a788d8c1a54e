//! Time-bounded ownership of a named recurring job.
//!
//! A lease record lives in the shared store and is the only thing instances
//! agree on. Nothing here talks to storage; the rules are expressed as pure
//! functions of `now` so every backend applies the same arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::OwnerToken;

/// Hold-time bounds applied to every acquisition of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeasePolicy {
    /// A release is never effective before this much time has passed since acquisition.
    pub min_hold: Duration,
    /// The lease expires this long after acquisition, released or not.
    pub max_hold: Duration,
}

impl LeasePolicy {
    pub fn new(min_hold: Duration, max_hold: Duration) -> Result<Self, DomainError> {
        if max_hold.is_zero() {
            return Err(DomainError::validation("max hold must be greater than zero"));
        }
        if min_hold > max_hold {
            return Err(DomainError::validation(format!(
                "min hold ({min_hold:?}) must not exceed max hold ({max_hold:?})"
            )));
        }
        Ok(Self { min_hold, max_hold })
    }

    pub fn from_secs(min_hold: u64, max_hold: u64) -> Result<Self, DomainError> {
        Self::new(Duration::from_secs(min_hold), Duration::from_secs(max_hold))
    }

    /// Expiry of a hold that starts at `acquired_at`.
    pub fn valid_until(&self, acquired_at: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(acquired_at, self.max_hold)
    }

    /// Earliest instant a hold that starts at `acquired_at` may end.
    pub fn earliest_release(&self, acquired_at: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(acquired_at, self.min_hold)
    }
}

/// A persisted lease record (one per job name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub job_name: String,
    pub owner_token: OwnerToken,
    pub acquired_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl Lease {
    /// Build the record a successful acquisition at `now` writes.
    pub fn granted(
        job_name: impl Into<String>,
        owner_token: OwnerToken,
        policy: &LeasePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            owner_token,
            acquired_at: now,
            valid_until: policy.valid_until(now),
        }
    }

    /// A lease is expired at its `valid_until` instant, not after it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    /// Whether `owner` may (re)acquire this record at `now`.
    pub fn admits(&self, owner: &OwnerToken, now: DateTime<Utc>) -> bool {
        self.is_expired(now) || &self.owner_token == owner
    }

    /// Where `valid_until` lands when the holder releases at `now`.
    ///
    /// Never earlier than `acquired_at + min_hold`, never later than the
    /// current expiry.
    pub fn release_deadline(&self, policy: &LeasePolicy, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = policy.earliest_release(self.acquired_at);
        now.max(floor).min(self.valid_until)
    }
}

/// `at + d`, clamped to the latest representable instant.
fn saturating_add(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
