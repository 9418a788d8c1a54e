use chrono::{DateTime, Utc};
use serde::Serialize;

use leasekeep_core::{Lease, StatusCounts, WorkItem};

#[derive(Debug, Serialize)]
pub struct WorkItemResponse {
    pub id: i64,
    pub owner_id: String,
    pub category: String,
    pub payload: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<WorkItem> for WorkItemResponse {
    fn from(item: WorkItem) -> Self {
        Self {
            id: item.id.get(),
            owner_id: item.owner_id,
            category: item.category,
            payload: item.payload,
            status: item.status.as_str().to_string(),
            created_at: item.created_at,
            updated_at: item.updated_at,
            processed_at: item.processed_at,
        }
    }
}

pub fn work_items_json(items: Vec<WorkItem>) -> Vec<WorkItemResponse> {
    items.into_iter().map(WorkItemResponse::from).collect()
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_reports: u64,
    pub pending_reports: u64,
    pub processing_reports: u64,
    pub completed_reports: u64,
    pub failed_reports: u64,
}

impl From<StatusCounts> for StatsResponse {
    fn from(c: StatusCounts) -> Self {
        Self {
            total_reports: c.total,
            pending_reports: c.pending,
            processing_reports: c.processing,
            completed_reports: c.completed,
            failed_reports: c.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaseResponse {
    pub job_name: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Expired as of the request time; the record stays until next acquisition.
    pub expired: bool,
}

impl LeaseResponse {
    pub fn at(lease: Lease, now: DateTime<Utc>) -> Self {
        Self {
            expired: lease.is_expired(now),
            job_name: lease.job_name,
            owner: lease.owner_token.as_str().to_string(),
            acquired_at: lease.acquired_at,
            valid_until: lease.valid_until,
        }
    }
}
