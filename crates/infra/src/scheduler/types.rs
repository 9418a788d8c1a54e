//! Job descriptors, bodies and tick outcomes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use leasekeep_core::{DomainError, LeasePolicy, OwnerToken};

use crate::error::StoreError;

/// Static description of a recurring job: its lease name, cadence and hold bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Lease name; identical on every instance.
    pub name: String,
    pub interval: Duration,
    pub lease: LeasePolicy,
}

impl JobDescriptor {
    /// Build a descriptor, enforcing `min_hold <= max_hold < interval`.
    ///
    /// A `max_hold` that reaches the interval would let an instance contend
    /// with its own previous tick.
    pub fn new(name: impl Into<String>, interval: Duration, lease: LeasePolicy) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("job name must not be empty"));
        }
        if lease.max_hold >= interval {
            return Err(DomainError::validation(format!(
                "job '{name}': max hold ({:?}) must be shorter than the interval ({interval:?})",
                lease.max_hold
            )));
        }
        Ok(Self { name, interval, lease })
    }
}

/// What a job body did during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Items inserted, completed or deleted.
    pub affected: u64,
    /// Items that ended up FAILED.
    pub failed: u64,
}

impl JobReport {
    pub fn affected(n: u64) -> Self {
        Self { affected: n, failed: 0 }
    }
}

/// Error that aborts a tick. The job is tried again on its next interval.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The body panicked; the panic was contained in the tick's own task.
    #[error("job body panicked: {0}")]
    Panicked(String),
}

/// The work a scheduled job performs once it holds its lease.
#[async_trait]
pub trait JobBody: Send + Sync + 'static {
    /// Run once. `started_at` is the instant the tick acquired its lease.
    async fn run(&self, started_at: DateTime<Utc>) -> Result<JobReport, JobError>;
}

#[async_trait]
impl<B> JobBody for Arc<B>
where
    B: JobBody + ?Sized,
{
    async fn run(&self, started_at: DateTime<Utc>) -> Result<JobReport, JobError> {
        (**self).run(started_at).await
    }
}

/// A descriptor paired with its body, ready to be registered.
#[derive(Clone)]
pub struct ScheduledJob {
    pub descriptor: JobDescriptor,
    pub body: Arc<dyn JobBody>,
}

impl ScheduledJob {
    pub fn new(descriptor: JobDescriptor, body: impl JobBody) -> Self {
        Self {
            descriptor,
            body: Arc::new(body),
        }
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The lease was acquired and the body ran to completion.
    Ran(JobReport),
    /// Another instance holds the lease; nothing ran.
    Skipped { holder: Option<OwnerToken> },
}

/// Per-job counters kept by a running scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub ticks: u64,
    pub ran: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}
