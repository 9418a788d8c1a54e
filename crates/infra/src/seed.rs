//! Demo dataset loaded at startup when the work item table is empty.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use leasekeep_core::{NewWorkItem, WorkItemStatus};

use crate::error::StoreError;
use crate::work_items::WorkItemStore;

struct DemoItem {
    owner_id: &'static str,
    category: &'static str,
    payload: &'static str,
    /// Minutes before `now` at which the item was processed; `None` leaves it PENDING.
    processed_ago: Option<i64>,
}

const DEMO_ITEMS: [DemoItem; 8] = [
    DemoItem { owner_id: "user001", category: "MONTHLY_SALES", payload: "Monthly sales report data", processed_ago: None },
    DemoItem { owner_id: "user002", category: "WEEKLY_ANALYTICS", payload: "Weekly analytics data", processed_ago: None },
    DemoItem { owner_id: "user003", category: "DAILY_METRICS", payload: "Daily metrics report", processed_ago: None },
    DemoItem { owner_id: "user004", category: "QUARTERLY_SUMMARY", payload: "Quarterly business summary", processed_ago: None },
    DemoItem { owner_id: "user005", category: "ANNUAL_REPORT", payload: "Annual financial report", processed_ago: None },
    DemoItem { owner_id: "user001", category: "CUSTOMER_ANALYSIS", payload: "Customer behavior analysis", processed_ago: Some(120) },
    DemoItem { owner_id: "user002", category: "PRODUCT_PERFORMANCE", payload: "Product performance metrics", processed_ago: Some(30) },
    DemoItem { owner_id: "user003", category: "MARKETING_CAMPAIGN", payload: "Marketing campaign results", processed_ago: None },
];

/// Insert the demo dataset unless the store already holds items.
///
/// Returns the number of items inserted. PENDING items are created over the
/// previous hour; COMPLETED ones are created five minutes before they were
/// processed so `created_at <= processed_at` holds.
///
/// The emptiness check and the inserts are separate statements, so two
/// instances starting at the same moment against an empty shared table can
/// both seed. Enable `SEED_DEMO_DATA` on one instance only in a cluster.
pub async fn seed_demo_data<S: WorkItemStore>(store: &S, now: DateTime<Utc>) -> Result<usize, StoreError> {
    if store.count().await? > 0 {
        info!("work items already present; skipping demo data");
        return Ok(0);
    }

    for (i, demo) in DEMO_ITEMS.iter().enumerate() {
        let new = NewWorkItem::new(demo.owner_id, demo.category, demo.payload)?;

        match demo.processed_ago {
            None => {
                let created_at = now - Duration::minutes(55 - 7 * i as i64);
                store.insert(new, created_at).await?;
            }
            Some(ago) => {
                let processed_at = now - Duration::minutes(ago);
                let mut item = store.insert(new, processed_at - Duration::minutes(5)).await?;
                item.start_processing(processed_at)?;
                store.save_transition(&item, WorkItemStatus::Pending).await?;
                let payload = format!("Processed: {}", item.payload);
                item.complete(payload, processed_at)?;
                store.save_transition(&item, WorkItemStatus::Processing).await?;
            }
        }
    }

    info!(count = DEMO_ITEMS.len(), "demo work items inserted");
    Ok(DEMO_ITEMS.len())
}
