//! Daemon command for running the scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::info;

use chronoprint_scheduler::SchedulerConfig;

use crate::commands::{StoreArgs, connect};

/// Load schedules and fire them until Ctrl-C.
pub async fn run(store: &StoreArgs, tick_interval: Duration) -> Result<()> {
    let scheduler = connect(store)
        .await?
        .with_config(SchedulerConfig { tick_interval });
    let scheduler = Arc::new(scheduler);

    info!(
        schedules = scheduler.list_schedules().await.len(),
        store_url = %store.url,
        "daemon starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    scheduler_handle
        .await
        .map_err(|e| miette::miette!("scheduler task failed: {}", e))?;

    info!("daemon stopped");
    Ok(())
}
