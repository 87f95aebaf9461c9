//! `keeld serve`: tracker lifecycle.

use std::time::Duration;

use keel_cluster::ClusterRegistry;
use keel_core::KeelConfig;
use keel_state::ServiceContext;
use keel_tracker::{InstanceService, Tracker};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Upper bound on waiting for the last heartbeat at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn run(config: KeelConfig, ctx: ServiceContext) -> anyhow::Result<()> {
    info!("Keel daemon starting");

    let clusters = ClusterRegistry::from_context(&ctx, config.clusters.defaults.clone());
    let known = clusters.list()?;
    info!(clusters = known.len(), "cluster registry loaded");

    let tracker = Tracker::start(&config, &ctx)?;
    match tracker.current_instance().await {
        Ok(me) => info!(instance = %me.name, addresses = ?me.addresses, "tracking this replica"),
        Err(e) => warn!(error = %e, "could not describe this replica"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        deadline.cancel();
    });
    if let Err(e) = tracker.shutdown(&cancel).await {
        warn!(error = %e, "tracker did not stop in time");
    }

    info!("Keel daemon stopped");
    Ok(())
}
