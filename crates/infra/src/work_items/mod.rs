//! Durable table of work items.
//!
//! The store owns id assignment and timestamps; status changes are
//! compare-and-set writes validated against the lifecycle in
//! `leasekeep_core::work_item`.

pub mod postgres;
pub mod store;

pub use postgres::PostgresWorkItemStore;
pub use store::{InMemoryWorkItemStore, WorkItemStore};
