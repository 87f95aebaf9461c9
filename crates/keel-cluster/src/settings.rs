//! Per-cluster build settings read from `custom_data`.
//!
//! A key is looked up as `<pool>:<key>`, then `<key>`, then in the
//! `[clusters.defaults]` config table.

use std::collections::BTreeMap;

use keel_state::Cluster;

pub const BUILD_SERVICE_ADDRESS: &str = "build-service-address";
pub const BUILD_SERVICE_TLS: &str = "build-service-tls";
pub const REGISTRY: &str = "registry";
pub const REGISTRY_INSECURE: &str = "registry-insecure";
pub const DISABLE_PLATFORM_BUILD: &str = "disable-platform-build";

/// Settings relevant to dispatching builds to one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSettings {
    pub build_service_address: Option<String>,
    pub build_service_tls: bool,
    pub registry: Option<String>,
    pub registry_insecure: bool,
    pub disable_platform_build: bool,
}

impl ClusterSettings {
    /// Resolve settings for `cluster` in the context of `pool` (may be empty).
    pub fn resolve(cluster: &Cluster, pool: &str, defaults: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| lookup(cluster, pool, key, defaults);
        Self {
            build_service_address: get(BUILD_SERVICE_ADDRESS),
            build_service_tls: parse_bool(get(BUILD_SERVICE_TLS)),
            registry: get(REGISTRY),
            registry_insecure: parse_bool(get(REGISTRY_INSECURE)),
            disable_platform_build: parse_bool(get(DISABLE_PLATFORM_BUILD)),
        }
    }
}

/// Raw value of `key`, empty strings treated as unset.
pub fn lookup(
    cluster: &Cluster,
    pool: &str,
    key: &str,
    defaults: &BTreeMap<String, String>,
) -> Option<String> {
    let scoped = (!pool.is_empty())
        .then(|| cluster.custom_data.get(&format!("{pool}:{key}")))
        .flatten();
    scoped
        .or_else(|| cluster.custom_data.get(key))
        .or_else(|| defaults.get(key))
        .filter(|v| !v.is_empty())
        .cloned()
}

/// `true`/`1`/`t` in any case; everything else, including garbage, is false.
fn parse_bool(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "1" | "t")
    )
}
