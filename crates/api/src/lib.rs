//! HTTP API: read-only query surface over work items and leases.

pub mod app;
pub mod shutdown;
