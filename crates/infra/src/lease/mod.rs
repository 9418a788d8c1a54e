//! Distributed lease/lock management.
//!
//! ## Design
//!
//! - One lease record per job name lives in the shared store
//! - Acquisition is a single conditional write (absent, expired, or own hold)
//! - `max_hold` bounds a crashed holder; `min_hold` floors the spacing between
//!   two runs of the same job anywhere in the cluster
//! - No in-process lock participates in exclusivity; instances only share the store
//!
//! ## Components
//!
//! - `LeaseStore`: persistence for lease records (in-memory or Postgres)
//! - `LeaseManager`: acquire/extend/release protocol for one instance

pub mod manager;
pub mod postgres;
pub mod store;

pub use manager::{LeaseError, LeaseManager};
pub use postgres::PostgresLeaseStore;
pub use store::{InMemoryLeaseStore, LeaseStore};
