//! ClusterRegistry: read-mostly lookup of provisioner clusters.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use keel_state::{Cluster, ClusterStore, ServiceContext};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::settings::ClusterSettings;

/// Maximum length of a cluster name.
pub const MAX_CLUSTER_NAME_LENGTH: usize = 40;

static CLUSTER_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").ok());

#[derive(Clone)]
pub struct ClusterRegistry {
    store: Arc<dyn ClusterStore>,
    /// `[clusters.defaults]` from the config file.
    defaults: BTreeMap<String, String>,
}

impl ClusterRegistry {
    pub fn new(store: Arc<dyn ClusterStore>, defaults: BTreeMap<String, String>) -> Self {
        Self { store, defaults }
    }

    pub fn from_context(ctx: &ServiceContext, defaults: BTreeMap<String, String>) -> Self {
        Self::new(ctx.clusters.clone(), defaults)
    }

    /// Validate and store a cluster, replacing any cluster of the same name.
    pub fn save(&self, mut cluster: Cluster) -> ClusterResult<()> {
        cluster.name = cluster.name.trim().to_string();
        validate(&cluster)?;
        if cluster.default {
            let other_default = self
                .store
                .clusters_for_provisioner(&cluster.provisioner)?
                .into_iter()
                .find(|c| c.default && c.name != cluster.name);
            if let Some(other) = other_default {
                return Err(ClusterError::Validation(format!(
                    "cluster {} is already the default for provisioner {}",
                    other.name, cluster.provisioner
                )));
            }
        }
        self.store.upsert_cluster(&cluster)?;
        info!(cluster = %cluster.name, provisioner = %cluster.provisioner, "cluster saved");
        Ok(())
    }

    pub fn list(&self) -> ClusterResult<Vec<Cluster>> {
        Ok(self.store.list_clusters()?)
    }

    pub fn find_by_name(&self, name: &str) -> ClusterResult<Cluster> {
        self.store
            .get_cluster(name)?
            .ok_or_else(|| ClusterError::ClusterNotFound(name.to_string()))
    }

    pub fn find_by_provisioner(&self, provisioner: &str) -> ClusterResult<Vec<Cluster>> {
        Ok(self.store.clusters_for_provisioner(provisioner)?)
    }

    /// The cluster serving `pool`, or the provisioner's default.
    pub fn find_by_pool(&self, provisioner: &str, pool: &str) -> ClusterResult<Cluster> {
        let clusters = self.store.clusters_for_provisioner(provisioner)?;
        pick_for_pool(&clusters, pool)
    }

    /// Resolve several pools at once. Every pool must resolve.
    pub fn find_by_pools(
        &self,
        provisioner: &str,
        pools: &[String],
    ) -> ClusterResult<BTreeMap<String, Cluster>> {
        let clusters = self.store.clusters_for_provisioner(provisioner)?;
        let mut result = BTreeMap::new();
        for pool in pools {
            let cluster = match pick_for_pool(&clusters, pool) {
                Err(ClusterError::NoCluster) => {
                    return Err(ClusterError::NoClusterForPool(pool.clone()));
                }
                other => other?,
            };
            result.insert(pool.clone(), cluster);
        }
        Ok(result)
    }

    pub fn delete(&self, name: &str) -> ClusterResult<()> {
        if !self.store.delete_cluster(name)? {
            return Err(ClusterError::ClusterNotFound(name.to_string()));
        }
        info!(cluster = %name, "cluster deleted");
        Ok(())
    }

    /// Build settings of `cluster` as seen from `pool`.
    pub fn settings(&self, cluster: &Cluster, pool: &str) -> ClusterSettings {
        ClusterSettings::resolve(cluster, pool, &self.defaults)
    }
}

fn pick_for_pool(clusters: &[Cluster], pool: &str) -> ClusterResult<Cluster> {
    let mut serving = clusters.iter().filter(|c| c.serves_pool(pool));
    match (serving.next(), serving.next()) {
        (Some(_), Some(_)) => Err(ClusterError::TooManyPools(pool.to_string())),
        (Some(cluster), None) => {
            debug!(cluster = %cluster.name, %pool, "cluster found for pool");
            Ok(cluster.clone())
        }
        (None, _) => {
            let cluster = clusters
                .iter()
                .find(|c| c.default)
                .cloned()
                .ok_or(ClusterError::NoCluster)?;
            debug!(cluster = %cluster.name, %pool, "default cluster used for pool");
            Ok(cluster)
        }
    }
}

fn validate(cluster: &Cluster) -> ClusterResult<()> {
    if cluster.name.is_empty() {
        return Err(ClusterError::Validation("cluster name is mandatory".into()));
    }
    let pattern_ok = CLUSTER_NAME_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(&cluster.name));
    if !pattern_ok || cluster.name.len() > MAX_CLUSTER_NAME_LENGTH {
        return Err(ClusterError::Validation(format!(
            "invalid cluster name, cluster name should have at most {MAX_CLUSTER_NAME_LENGTH} \
             characters, containing only lower case letters, numbers or dashes, \
             starting with a letter"
        )));
    }
    if cluster.provisioner.is_empty() {
        return Err(ClusterError::Validation("provisioner name is mandatory".into()));
    }
    match (cluster.pools.is_empty(), cluster.default) {
        (false, true) => Err(ClusterError::Validation(
            "cannot have both pools and default set".into(),
        )),
        (true, false) => Err(ClusterError::Validation(
            "either default or a list of pools must be set".into(),
        )),
        _ => Ok(()),
    }
}
