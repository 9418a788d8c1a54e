//! The three recurring work-item jobs and their schedule.
//!
//! | Lease name              | Interval | Min hold | Max hold |
//! |-------------------------|----------|----------|----------|
//! | `processPendingReports` | 30s      | 5s       | 25s      |
//! | `generateSampleReports` | 120s     | 10s      | 110s     |
//! | `cleanupOldReports`     | 300s     | 10s      | 290s     |

pub mod cleanup;
pub mod generate;
pub mod ingest;
pub mod processor;

use std::time::Duration;

use leasekeep_core::{DomainError, LeasePolicy};

use crate::scheduler::{JobDescriptor, ScheduledJob};
use crate::work_items::WorkItemStore;

pub use cleanup::CleanupStaleJob;
pub use generate::GenerateSampleJob;
pub use ingest::IngestPendingJob;
pub use processor::{ItemProcessor, ProcessingError, SimulatedProcessor};

pub const INGEST_PENDING: &str = "processPendingReports";
pub const GENERATE_SAMPLE: &str = "generateSampleReports";
pub const CLEANUP_STALE: &str = "cleanupOldReports";

/// Tunables for the job bodies; the schedule itself is fixed.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub processing_delay: Duration,
    pub retention: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            processing_delay: SimulatedProcessor::DEFAULT_DELAY,
            retention: cleanup::DEFAULT_RETENTION,
        }
    }
}

fn descriptor(name: &str, interval_secs: u64, min_hold_secs: u64, max_hold_secs: u64) -> Result<JobDescriptor, DomainError> {
    JobDescriptor::new(
        name,
        Duration::from_secs(interval_secs),
        LeasePolicy::from_secs(min_hold_secs, max_hold_secs)?,
    )
}

/// Ingest, generate and cleanup, bound to `store`.
pub fn standard_jobs<S>(store: S, settings: &JobSettings) -> Result<Vec<ScheduledJob>, DomainError>
where
    S: WorkItemStore + Clone + 'static,
{
    Ok(vec![
        ScheduledJob::new(
            descriptor(INGEST_PENDING, 30, 5, 25)?,
            IngestPendingJob::new(store.clone(), SimulatedProcessor::new(settings.processing_delay)),
        ),
        ScheduledJob::new(
            descriptor(GENERATE_SAMPLE, 120, 10, 110)?,
            GenerateSampleJob::new(store.clone()),
        ),
        ScheduledJob::new(
            descriptor(CLEANUP_STALE, 300, 10, 290)?,
            CleanupStaleJob::new(store, settings.retention),
        ),
    ])
}
