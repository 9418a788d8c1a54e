//! Periodic driver: one timer task per registered job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use leasekeep_core::DomainError;

use crate::lease::{LeaseError, LeaseManager, LeaseStore};

use super::types::{JobError, JobStats, ScheduledJob, TickOutcome};

type SharedStats = Arc<Mutex<HashMap<String, JobStats>>>;

/// Registry of scheduled jobs bound to one instance's lease manager.
///
/// Exclusivity across instances comes only from the lease store. Within one
/// instance each job has a single task that awaits its tick before waiting for
/// the next one, so ticks of the same job never overlap locally either.
pub struct JobScheduler<S> {
    leases: Arc<LeaseManager<S>>,
    jobs: Vec<ScheduledJob>,
}

impl<S: LeaseStore + 'static> JobScheduler<S> {
    pub fn new(leases: LeaseManager<S>) -> Self {
        Self {
            leases: Arc::new(leases),
            jobs: Vec::new(),
        }
    }

    /// Register a job. Names must be unique.
    pub fn register(&mut self, job: ScheduledJob) -> Result<(), DomainError> {
        if self.find(&job.descriptor.name).is_some() {
            return Err(DomainError::validation(format!(
                "job '{}' is already registered",
                job.descriptor.name
            )));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn with_jobs(mut self, jobs: impl IntoIterator<Item = ScheduledJob>) -> Result<Self, DomainError> {
        for job in jobs {
            self.register(job)?;
        }
        Ok(self)
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.descriptor.name.as_str()).collect()
    }

    pub fn lease_manager(&self) -> &LeaseManager<S> {
        &self.leases
    }

    fn find(&self, name: &str) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|j| j.descriptor.name == name)
    }

    /// Run a single tick of `name` now (tests, manual triggers).
    pub async fn run_tick(&self, name: &str) -> Result<TickOutcome, JobError> {
        let job = self
            .find(name)
            .ok_or_else(|| DomainError::validation(format!("unknown job '{name}'")))?;
        tick(&self.leases, job).await
    }

    /// Start one timer task per job. The first tick of every job fires immediately.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats: SharedStats = Arc::new(Mutex::new(HashMap::new()));

        let mut joins = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            if let Ok(mut s) = stats.lock() {
                s.insert(job.descriptor.name.clone(), JobStats::default());
            }
            joins.push(tokio::spawn(job_loop(
                self.leases.clone(),
                job,
                shutdown_rx.clone(),
                stats.clone(),
            )));
        }

        info!(owner = %self.leases.owner(), jobs = joins.len(), "scheduler started");

        SchedulerHandle {
            shutdown: shutdown_tx,
            joins,
            stats,
        }
    }
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    stats: SharedStats,
}

impl SchedulerHandle {
    /// Stop scheduling new ticks and wait for in-flight ticks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "job loop ended abnormally");
            }
        }
        info!("scheduler stopped");
    }

    /// Snapshot of per-job counters.
    pub fn stats(&self) -> HashMap<String, JobStats> {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

async fn job_loop<S: LeaseStore + 'static>(
    leases: Arc<LeaseManager<S>>,
    job: ScheduledJob,
    mut shutdown: watch::Receiver<bool>,
    stats: SharedStats,
) {
    let name = job.descriptor.name.clone();
    let mut interval = tokio::time::interval(job.descriptor.interval);
    // A tick that overruns its period drops the missed firings instead of bursting.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(job = %name, interval = ?job.descriptor.interval, "job loop started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        let result = tick(&leases, &job).await;

        if let Ok(mut s) = stats.lock() {
            let entry = s.entry(name.clone()).or_default();
            entry.ticks += 1;
            match &result {
                Ok(TickOutcome::Ran(_)) => {
                    entry.ran += 1;
                    entry.last_run_at = Some(Utc::now());
                }
                Ok(TickOutcome::Skipped { .. }) => entry.skipped += 1,
                Err(_) => entry.failed += 1,
            }
        }

        if let Err(e) = result {
            error!(job = %name, error = %e, "tick aborted; retrying on next interval");
        }
    }

    info!(job = %name, "job loop stopped");
}

/// Acquire, run, release.
///
/// The lease is released whatever the body returned (or if it panicked);
/// release never lands before `min_hold`. If this process dies mid-body the
/// lease simply expires at `max_hold`. A body that outlives `max_hold` keeps
/// running but has lost exclusivity; there is no forced interruption.
async fn tick<S: LeaseStore>(leases: &LeaseManager<S>, job: &ScheduledJob) -> Result<TickOutcome, JobError> {
    let descriptor = &job.descriptor;
    let started_at = Utc::now();

    let lease = match leases.acquire(&descriptor.name, &descriptor.lease, started_at).await {
        Ok(lease) => lease,
        Err(LeaseError::Held { holder, valid_until, .. }) => {
            debug!(job = %descriptor.name, ?holder, ?valid_until, "lease held elsewhere; skipping tick");
            return Ok(TickOutcome::Skipped { holder });
        }
        Err(LeaseError::Store(e)) => return Err(e.into()),
    };

    debug!(job = %descriptor.name, "running job");

    let body = job.body.clone();
    let result = match tokio::spawn(async move { body.run(started_at).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(JobError::Panicked(join_err.to_string())),
    };

    if let Err(e) = leases.release(&lease, &descriptor.lease, Utc::now()).await {
        // The lease will still expire at max_hold.
        warn!(job = %descriptor.name, error = %e, "failed to release lease");
    }

    let report = result?;
    debug!(job = %descriptor.name, affected = report.affected, failed = report.failed, "job finished");
    Ok(TickOutcome::Ran(report))
}
