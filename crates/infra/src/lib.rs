//! Infrastructure layer: stores, leases, scheduling and the recurring jobs.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod lease;
pub mod scheduler;
pub mod seed;
pub mod work_items;

pub use error::StoreError;
