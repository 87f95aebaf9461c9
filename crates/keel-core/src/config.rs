//! keel.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default heartbeat period of the instance tracker.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(15);

/// Default cut-off after which a tracked instance is considered stale.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(50);

/// Namespace used for image names when none is configured.
pub const DEFAULT_REPOSITORY_NAMESPACE: &str = "tsuru";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeelConfig {
    /// Plain listen address (`host:port`) advertised by the tracker.
    pub listen: Option<String>,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub clusters: ClustersConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrackerConfig {
    /// Heartbeat period in seconds.
    pub update_interval: Option<f64>,
    /// Live-instance cut-off in seconds.
    pub stale_timeout: Option<f64>,
    /// Interface whose addresses are published.
    pub interface: Option<String>,
    pub ipv4_only: bool,
    /// Derive live instances from an EndpointSlice instead of heartbeats.
    pub use_kubernetes: bool,
    pub kubernetes_namespace: Option<String>,
    pub kubernetes_service: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            update_interval: None,
            stale_timeout: None,
            interface: None,
            ipv4_only: true,
            use_kubernetes: false,
            kubernetes_namespace: None,
            kubernetes_service: None,
        }
    }
}

impl TrackerConfig {
    pub fn update_interval(&self) -> Duration {
        seconds_or(self.update_interval, DEFAULT_UPDATE_INTERVAL)
    }

    pub fn stale_timeout(&self) -> Duration {
        seconds_or(self.stale_timeout, DEFAULT_STALE_TIMEOUT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DockerConfig {
    /// Registry host prepended to every image name.
    pub registry: Option<String>,
    /// Repository namespace. An explicit empty string means "unset".
    pub repository_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClustersConfig {
    /// Fallback values for per-cluster `custom_data` keys.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl KeelConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: KeelConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn seconds_or(value: Option<f64>, default: Duration) -> Duration {
    match value {
        Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).unwrap_or(default),
        _ => default,
    }
}
