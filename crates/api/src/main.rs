use anyhow::Context;
use chrono::Utc;

use leasekeep_api::app::{self, services};
use leasekeep_api::shutdown;
use leasekeep_infra::config::AppConfig;
use leasekeep_infra::jobs;
use leasekeep_infra::lease::LeaseManager;
use leasekeep_infra::scheduler::JobScheduler;
use leasekeep_infra::seed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    leasekeep_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(instance = %config.instance_id, bind = %config.bind_addr, "starting instance");

    let services = services::build_services(&config)
        .await
        .context("failed to initialize stores")?;

    if config.seed_demo_data {
        seed::seed_demo_data(&services.work_items, Utc::now())
            .await
            .context("failed to seed demo data")?;
    }

    let leases = LeaseManager::new(services.leases.clone(), config.instance_id.clone());
    let scheduler = JobScheduler::new(leases)
        .with_jobs(jobs::standard_jobs(services.work_items.clone(), &config.jobs)?)?;
    let handle = scheduler.spawn();

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .context("http server failed")?;

    // Wait for in-flight ticks so their leases are released cleanly.
    handle.shutdown().await;
    Ok(())
}
