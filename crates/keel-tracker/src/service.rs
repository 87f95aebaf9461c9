//! The read side shared by both tracker variants.

use async_trait::async_trait;
use keel_state::TrackedInstance;

use crate::error::TrackerResult;

#[async_trait]
pub trait InstanceService: Send + Sync {
    /// This replica's own identity.
    async fn current_instance(&self) -> TrackerResult<TrackedInstance>;

    /// Replicas considered alive right now.
    async fn live_instances(&self) -> TrackerResult<Vec<TrackedInstance>>;
}
