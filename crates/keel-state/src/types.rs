//! Persisted document types.
//!
//! These types represent the stored state of application versions,
//! tracked instances, and provisioner clusters. All types serialize
//! to/from JSON for storage in redb tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application version number, unique within one aggregate.
pub type VersionNumber = u32;

// ── App versions ──────────────────────────────────────────────────

/// Per-application aggregate of every deployment version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppVersions {
    pub app_name: String,
    /// Highest version number ever allocated. Never decremented.
    pub count: VersionNumber,
    /// Version last promoted successfully, 0 when none.
    #[serde(default)]
    pub last_successful_version: VersionNumber,
    #[serde(default)]
    pub versions: BTreeMap<VersionNumber, AppVersionInfo>,
    pub updated_at: DateTime<Utc>,
    /// Compare-and-swap token, regenerated on every mutation.
    pub updated_hash: String,
    #[serde(default)]
    pub marked_to_removal: bool,
}

impl AppVersions {
    /// The row for `version`, if still present.
    pub fn get(&self, version: VersionNumber) -> Option<&AppVersionInfo> {
        self.versions.get(&version)
    }
}

/// One deployment version of an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppVersionInfo {
    pub version: VersionNumber,
    pub description: String,
    pub event_id: String,
    pub custom_build_tag: String,
    pub build_image: String,
    pub deploy_image: String,
    /// Process name → argument vector.
    pub processes: BTreeMap<String, Vec<String>>,
    /// `port/protocol` strings, in image order.
    pub exposed_ports: Vec<String>,
    /// Healthcheck, hooks, per-orchestrator overrides and unknown fields.
    pub custom_data: BTreeMap<String, serde_json::Value>,
    pub disabled: bool,
    pub disabled_reason: String,
    pub deploy_successful: bool,
    pub marked_to_removal: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Arguments for allocating a new pending version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVersionArgs {
    pub app: String,
    pub description: String,
    pub event_id: String,
    pub custom_build_tag: String,
}

/// Optional compare-and-swap guard for aggregate mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// When set, the mutation applies only if the stored hash equals it.
    pub previous_updated_hash: Option<String>,
}

impl WriteOptions {
    pub fn guarded(hash: impl Into<String>) -> Self {
        Self {
            previous_updated_hash: Some(hash.into()),
        }
    }

    /// The guard token, ignoring empty strings.
    pub fn guard(&self) -> Option<&str> {
        self.previous_updated_hash
            .as_deref()
            .filter(|h| !h.is_empty())
    }
}

// ── Tracker ───────────────────────────────────────────────────────

/// A heartbeat record of one control-plane replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedInstance {
    /// Host identifier, unique across the fleet.
    pub name: String,
    pub addresses: Vec<String>,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub tls_port: String,
    pub last_update: DateTime<Utc>,
}

// ── Clusters ──────────────────────────────────────────────────────

/// A provisioner cluster descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Cluster {
    pub name: String,
    pub provisioner: String,
    pub pools: Vec<String>,
    pub default: bool,
    pub addresses: Vec<String>,
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
    /// Build-service endpoint, registry location, and related flags.
    pub custom_data: BTreeMap<String, String>,
}

impl Cluster {
    pub fn serves_pool(&self, pool: &str) -> bool {
        self.pools.iter().any(|p| p == pool)
    }
}
