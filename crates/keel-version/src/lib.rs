//! keel-version: the application version registry.
//!
//! Owns the per-application [`AppVersions`](keel_state::AppVersions)
//! aggregate: allocation of monotone version numbers, optimistic
//! concurrency through the `updated_hash` token, and the
//! [`VersionHandle`] that refreshes one row before writing it back.
//!
//! Build metadata parsing lives here too: the [`procfile`] parser and the
//! [`yaml`] model of `tsuru.yaml`.

pub mod error;
pub mod handle;
pub mod procfile;
pub mod registry;
pub mod yaml;

pub use error::{VersionError, VersionResult};
pub use handle::{AddVersionData, VersionHandle};
pub use registry::VersionRegistry;
pub use yaml::TsuruYamlData;

use std::collections::BTreeMap;

/// Pick the process that receives external traffic.
///
/// `web` wins when present; otherwise a lone process; otherwise the
/// lexicographically smallest name; an empty map yields `""`.
pub fn web_process_name(processes: &BTreeMap<String, Vec<String>>) -> String {
    if processes.contains_key("web") {
        return "web".to_string();
    }
    processes.keys().next().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procs(names: &[&str]) -> BTreeMap<String, Vec<String>> {
        names
            .iter()
            .map(|n| (n.to_string(), vec![format!("run-{n}")]))
            .collect()
    }

    #[test]
    fn web_process_resolution() {
        assert_eq!(web_process_name(&procs(&[])), "");
        assert_eq!(web_process_name(&procs(&["worker", "web"])), "web");
        assert_eq!(web_process_name(&procs(&["worker2", "worker1"])), "worker1");
        assert_eq!(web_process_name(&procs(&["api"])), "api");
    }
}
