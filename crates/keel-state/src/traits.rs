//! Storage traits consumed by the control-plane services.
//!
//! Each trait maps onto one collection. Every mutation is a
//! single-document operation; none of them retry internally.

use std::time::Duration;

use crate::error::StateResult;
use crate::types::*;

/// Storage for per-application version aggregates.
///
/// Mutations taking [`WriteOptions`] fail with
/// [`StateError::HashMismatch`](crate::StateError::HashMismatch) when a guard
/// is supplied and differs from the stored hash, and with
/// [`StateError::NotFound`](crate::StateError::NotFound) when the aggregate
/// does not exist. On success they rotate `updated_hash` and advance
/// `updated_at`.
pub trait VersionStore: Send + Sync {
    /// Increment `count` and install `versions[count]` in one upsert.
    fn new_app_version(&self, args: &NewVersionArgs) -> StateResult<AppVersionInfo>;

    fn app_versions(&self, app: &str) -> StateResult<Option<AppVersions>>;

    /// All aggregates, optionally restricted to the given app names.
    fn all_app_versions(&self, app_filter: &[String]) -> StateResult<Vec<AppVersions>>;

    /// Replace one entry of `versions`.
    fn update_version(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> StateResult<()>;

    /// Replace one entry and point `last_successful_version` at it.
    fn update_version_success(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> StateResult<()>;

    /// Unset entries from `versions`; `count` is untouched.
    fn delete_version_ids(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> StateResult<()>;

    /// Tombstone existing entries. Every listed entry must exist.
    fn mark_versions_to_removal(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> StateResult<()>;

    /// Tombstone the whole aggregate.
    fn mark_to_removal(&self, app: &str, opts: &WriteOptions) -> StateResult<()>;

    /// Drop every entry and clear the tombstone, keeping `count`.
    fn delete_versions(&self, app: &str, opts: &WriteOptions) -> StateResult<()>;
}

/// Storage for the heartbeat registry.
pub trait InstanceStore: Send + Sync {
    /// Upsert the record keyed by `instance.name`.
    fn notify(&self, instance: &TrackedInstance) -> StateResult<()>;

    /// Records with `last_update > now - stale_timeout`.
    fn list_live(&self, stale_timeout: Duration) -> StateResult<Vec<TrackedInstance>>;
}

/// Storage for provisioner clusters.
pub trait ClusterStore: Send + Sync {
    fn upsert_cluster(&self, cluster: &Cluster) -> StateResult<()>;

    fn get_cluster(&self, name: &str) -> StateResult<Option<Cluster>>;

    fn list_clusters(&self) -> StateResult<Vec<Cluster>>;

    /// Delete a cluster. Returns true if it existed.
    fn delete_cluster(&self, name: &str) -> StateResult<bool>;

    fn clusters_for_provisioner(&self, provisioner: &str) -> StateResult<Vec<Cluster>> {
        Ok(self
            .list_clusters()?
            .into_iter()
            .filter(|c| c.provisioner == provisioner)
            .collect())
    }
}
