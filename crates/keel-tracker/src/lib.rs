//! keel-tracker: the registry of live control-plane replicas.
//!
//! Two variants sit behind [`InstanceService`]:
//!
//! - **heartbeat** ([`InstanceTracker`]): a background task upserts this
//!   host into the `tracker` table; reads return the records fresher
//!   than `stale_timeout`.
//! - **kubernetes** ([`KubeInstanceTracker`]): read-only, derived from the
//!   EndpointSlices of the API service. Selected by `tracker.use-kubernetes`.

pub mod error;
pub mod host;
pub mod kube;
pub mod service;
pub mod tracker;

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::KeelConfig;
use keel_state::{ServiceContext, TrackedInstance};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::{TrackerError, TrackerResult};
pub use host::{HostIdentity, HostOptions, SystemHost};
pub use kube::{ApiServerSource, KubeInstanceTracker};
pub use service::InstanceService;
pub use tracker::{InstanceTracker, TrackerOptions};

/// The tracker variant selected by configuration.
pub enum Tracker {
    Heartbeat(InstanceTracker),
    Kubernetes(KubeInstanceTracker),
}

impl Tracker {
    /// Start the configured tracker variant against the real host.
    pub fn start(config: &KeelConfig, ctx: &ServiceContext) -> TrackerResult<Self> {
        Self::start_with_host(config, ctx, Arc::new(SystemHost))
    }

    pub fn start_with_host(
        config: &KeelConfig,
        ctx: &ServiceContext,
        host: Arc<dyn HostIdentity>,
    ) -> TrackerResult<Self> {
        let opts = TrackerOptions::from_config(config);
        if config.tracker.use_kubernetes {
            let namespace = config
                .tracker
                .kubernetes_namespace
                .clone()
                .ok_or(TrackerError::MissingConfig("tracker.kubernetes-namespace"))?;
            let service = config
                .tracker
                .kubernetes_service
                .clone()
                .ok_or(TrackerError::MissingConfig("tracker.kubernetes-service"))?;
            let source = Arc::new(ApiServerSource::in_cluster()?);
            info!(%namespace, %service, "using kubernetes instance tracker");
            let tracker = KubeInstanceTracker::new(
                source,
                ctx.clock.clone(),
                host.as_ref(),
                &opts.host,
                namespace,
                service,
            )?;
            return Ok(Tracker::Kubernetes(tracker));
        }
        Ok(Tracker::Heartbeat(InstanceTracker::start(
            ctx.instances.clone(),
            ctx.clock.clone(),
            host,
            opts,
        )))
    }

    /// Stop heartbeats, if any.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> TrackerResult<()> {
        match self {
            Tracker::Heartbeat(t) => t.shutdown(cancel).await,
            Tracker::Kubernetes(_) => Ok(()),
        }
    }

    fn service(&self) -> &dyn InstanceService {
        match self {
            Tracker::Heartbeat(t) => t,
            Tracker::Kubernetes(t) => t,
        }
    }
}

#[async_trait]
impl InstanceService for Tracker {
    async fn current_instance(&self) -> TrackerResult<TrackedInstance> {
        self.service().current_instance().await
    }

    async fn live_instances(&self) -> TrackerResult<Vec<TrackedInstance>> {
        self.service().live_instances().await
    }
}
