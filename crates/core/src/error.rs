//! Domain error model.

use thiserror::Error;

use crate::work_item::WorkItemStatus;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, illegal transitions). Storage concerns belong to infra.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A work item was asked to move along an edge the lifecycle does not allow.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkItemStatus,
        to: WorkItemStatus,
    },

    /// A status label could not be parsed.
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: WorkItemStatus, to: WorkItemStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
