//! The per-item processing step of the ingest job.

use std::time::Duration;

use async_trait::async_trait;

use leasekeep_core::WorkItem;

/// Processing failed for one item. The item is marked FAILED; the tick goes on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("processing failed: {0}")]
pub struct ProcessingError(pub String);

impl ProcessingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Turns a PROCESSING item's payload into its processed form.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    async fn process(&self, item: &WorkItem) -> Result<String, ProcessingError>;
}

/// Stand-in for real processing: waits `delay`, then prefixes the payload.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedProcessor {
    delay: Duration,
}

impl SimulatedProcessor {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl ItemProcessor for SimulatedProcessor {
    async fn process(&self, item: &WorkItem) -> Result<String, ProcessingError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("Processed: {}", item.payload))
    }
}
