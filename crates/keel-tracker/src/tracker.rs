//! Heartbeat-backed instance tracker.
//!
//! One background task per process upserts this host's
//! [`TrackedInstance`] every `update_interval`. Failed heartbeats are
//! logged and counted; the loop only stops on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keel_core::config::{DEFAULT_STALE_TIMEOUT, DEFAULT_UPDATE_INTERVAL};
use keel_core::{Clock, KeelConfig};
use keel_state::{InstanceStore, TrackedInstance};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::host::{HostIdentity, HostOptions, describe_instance};
use crate::service::InstanceService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerOptions {
    pub update_interval: Duration,
    pub stale_timeout: Duration,
    pub host: HostOptions,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            host: HostOptions::default(),
        }
    }
}

impl TrackerOptions {
    pub fn from_config(config: &KeelConfig) -> Self {
        Self {
            update_interval: config.tracker.update_interval(),
            stale_timeout: config.tracker.stale_timeout(),
            host: HostOptions::from_config(config),
        }
    }
}

/// State shared between the tracker handle and its heartbeat task.
struct Shared {
    store: Arc<dyn InstanceStore>,
    clock: Arc<dyn Clock>,
    host: Arc<dyn HostIdentity>,
    opts: TrackerOptions,
    last_instance: Mutex<Option<TrackedInstance>>,
    failed_heartbeats: AtomicU64,
}

impl Shared {
    fn describe(&self) -> TrackerResult<TrackedInstance> {
        let instance = describe_instance(self.host.as_ref(), &self.opts.host, self.clock.now())?;
        let mut last = self.last_instance.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(instance.clone());
        Ok(instance)
    }

    fn heartbeat(&self) -> TrackerResult<TrackedInstance> {
        let instance = self.describe()?;
        self.store.notify(&instance)?;
        Ok(instance)
    }
}

pub struct InstanceTracker {
    shared: Arc<Shared>,
    quit: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl InstanceTracker {
    /// Spawn the heartbeat task. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn InstanceStore>,
        clock: Arc<dyn Clock>,
        host: Arc<dyn HostIdentity>,
        opts: TrackerOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            store,
            clock,
            host,
            opts,
            last_instance: Mutex::new(None),
            failed_heartbeats: AtomicU64::new(0),
        });
        let (quit, quit_rx) = watch::channel(false);
        let (done_tx, done) = watch::channel(false);
        tokio::spawn(run_heartbeat(shared.clone(), quit_rx, done_tx));
        Self { shared, quit, done }
    }

    /// Stop the heartbeat and wait for the task to acknowledge.
    ///
    /// A heartbeat in flight completes first. Returns
    /// [`TrackerError::Cancelled`] if `cancel` fires before the
    /// acknowledgement arrives.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> TrackerResult<()> {
        self.quit.send_replace(true);
        let mut done = self.done.clone();
        tokio::select! {
            biased;
            // A dropped sender means the task is gone; that counts as done.
            _ = done.wait_for(|d| *d) => Ok(()),
            () = cancel.cancelled() => Err(TrackerError::Cancelled),
        }
    }

    /// Heartbeats that failed since start.
    pub fn failed_heartbeats(&self) -> u64 {
        self.shared.failed_heartbeats.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.shared.opts
    }
}

#[async_trait]
impl InstanceService for InstanceTracker {
    /// The identity of the last heartbeat, or a fresh one before the first.
    async fn current_instance(&self) -> TrackerResult<TrackedInstance> {
        let last = self
            .shared
            .last_instance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match last {
            Some(instance) => Ok(instance),
            None => self.shared.describe(),
        }
    }

    async fn live_instances(&self) -> TrackerResult<Vec<TrackedInstance>> {
        Ok(self.shared.store.list_live(self.shared.opts.stale_timeout)?)
    }
}

async fn run_heartbeat(
    shared: Arc<Shared>,
    mut quit: watch::Receiver<bool>,
    done: watch::Sender<bool>,
) {
    info!(interval = ?shared.opts.update_interval, "instance tracker started");
    loop {
        match shared.heartbeat() {
            Ok(instance) => {
                debug!(
                    instance = %instance.name,
                    addresses = ?instance.addresses,
                    "heartbeat sent"
                );
            }
            Err(e) => {
                let failed = shared.failed_heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, failed, "unable to track instance");
            }
        }
        if *quit.borrow() {
            break;
        }
        tokio::select! {
            _ = quit.changed() => break,
            _ = tokio::time::sleep(shared.opts.update_interval) => {}
        }
    }
    info!("instance tracker stopped");
    done.send_replace(true);
}
