//! Cluster-wide "at most once per interval" job scheduling.
//!
//! ## Design
//!
//! - Every instance registers the same jobs under the same lease names
//! - Each tick first tries to take the job's lease; losers skip the tick
//! - The body runs in its own task so a panic only fails that tick
//! - The lease is released after the body but never before `min_hold`
//!
//! ## Components
//!
//! - `JobDescriptor`: lease name, interval and hold bounds
//! - `JobBody`: the work performed while holding the lease
//! - `JobScheduler`: registry plus per-job timer tasks
//! - `SchedulerHandle`: shutdown and per-job counters

pub mod executor;
pub mod types;

pub use executor::{JobScheduler, SchedulerHandle};
pub use types::{JobBody, JobDescriptor, JobError, JobReport, JobStats, ScheduledJob, TickOutcome};
