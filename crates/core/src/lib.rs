//! `leasekeep-core`: domain building blocks.
//!
//! This crate contains **pure domain** types (no storage, no runtime): lease
//! records and their hold-time arithmetic, and the work item state machine.

pub mod error;
pub mod id;
pub mod lease;
pub mod work_item;

pub use error::{DomainError, DomainResult};
pub use id::{OwnerToken, WorkItemId};
pub use lease::{Lease, LeasePolicy};
pub use work_item::{NewWorkItem, StatusCounts, WorkItem, WorkItemStatus};
