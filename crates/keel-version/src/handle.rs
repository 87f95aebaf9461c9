//! A handle on one row of an app's version aggregate.
//!
//! The handle caches an [`AppVersionInfo`] but never writes it back
//! blindly: every mutation re-reads the aggregate, applies its change to
//! the fresh row, and writes with the fresh `updated_hash` as guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use keel_core::{App, ImageNaming};
use keel_state::{AppVersionInfo, VersionNumber, VersionStore, WriteOptions};
use serde_json::Value;
use tracing::debug;

use crate::error::{VersionError, VersionResult};
use crate::yaml::{TsuruYamlData, processes_from_value};
use crate::{procfile, web_process_name};

/// Build metadata attached to a pending version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddVersionData {
    /// Explicit processes. When empty they are derived from `custom_data`.
    pub processes: BTreeMap<String, Vec<String>>,
    /// Replaces the stored custom data when set.
    pub custom_data: Option<BTreeMap<String, Value>>,
    pub exposed_ports: Vec<String>,
}

#[derive(Clone)]
pub struct VersionHandle {
    store: Arc<dyn VersionStore>,
    naming: ImageNaming,
    app: App,
    info: AppVersionInfo,
}

impl std::fmt::Debug for VersionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionHandle")
            .field("app", &self.app.name)
            .field("version", &self.info.version)
            .finish()
    }
}

impl VersionHandle {
    pub(crate) fn new(
        store: Arc<dyn VersionStore>,
        naming: ImageNaming,
        app: App,
        info: AppVersionInfo,
    ) -> Self {
        Self {
            store,
            naming,
            app,
            info,
        }
    }

    pub fn version(&self) -> VersionNumber {
        self.info.version
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// The cached row, as of the last refresh or write.
    pub fn info(&self) -> &AppVersionInfo {
        &self.info
    }

    /// Reload the row from the aggregate, returning the current hash.
    pub fn refresh(&mut self) -> VersionResult<String> {
        let doc = self
            .store
            .app_versions(&self.app.name)?
            .ok_or(VersionError::NoVersionsAvailable)?;
        let info = doc
            .get(self.info.version)
            .cloned()
            .ok_or_else(|| VersionError::VersionNotAvailable {
                app: self.app.name.clone(),
                version: self.info.version,
            })?;
        self.info = info;
        Ok(doc.updated_hash)
    }

    /// Refresh, apply `change`, then write with the refreshed hash as guard.
    fn modify<F>(&mut self, successful: bool, change: F) -> VersionResult<()>
    where
        F: FnOnce(&mut AppVersionInfo),
    {
        let hash = self.refresh()?;
        let mut info = self.info.clone();
        change(&mut info);
        let opts = WriteOptions::guarded(hash);
        if successful {
            self.store
                .update_version_success(&self.app.name, &info, &opts)?;
        } else {
            self.store.update_version(&self.app.name, &info, &opts)?;
        }
        self.info = info;
        Ok(())
    }

    pub fn add_data(&mut self, data: AddVersionData) -> VersionResult<()> {
        self.modify(false, |info| {
            if let Some(custom_data) = data.custom_data {
                info.custom_data = custom_data;
            }
            info.processes = if data.processes.is_empty() {
                processes_from_custom_data(&info.custom_data)
            } else {
                data.processes
            };
            info.exposed_ports = data.exposed_ports;
        })?;
        debug!(
            app = %self.app.name,
            version = self.info.version,
            processes = self.info.processes.len(),
            "version data added"
        );
        Ok(())
    }

    pub fn commit_build_image(&mut self) -> VersionResult<()> {
        let image = self.build_image_name();
        self.modify(false, |info| info.build_image = image)
    }

    pub fn commit_base_image(&mut self) -> VersionResult<()> {
        let image = self.base_image_name();
        self.modify(false, |info| info.deploy_image = image)
    }

    /// Mark the version deployed and make it the latest successful one.
    pub fn commit_successful(&mut self) -> VersionResult<()> {
        self.modify(true, |info| info.deploy_successful = true)
    }

    pub fn mark_to_removal(&mut self) -> VersionResult<()> {
        self.modify(false, |info| info.marked_to_removal = true)
    }

    pub fn toggle_enabled(&mut self, enabled: bool, reason: &str) -> VersionResult<()> {
        let reason = if enabled { String::new() } else { reason.to_string() };
        self.modify(false, |info| {
            info.disabled = !enabled;
            info.disabled_reason = reason;
        })
    }

    pub fn processes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.info.processes
    }

    pub fn web_process(&self) -> String {
        web_process_name(&self.info.processes)
    }

    pub fn process_command(&self, name: &str) -> VersionResult<&[String]> {
        self.info
            .processes
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| VersionError::ProcessNotFound {
                name: name.to_string(),
            })
    }

    pub fn tsuru_yaml_data(&self) -> VersionResult<TsuruYamlData> {
        TsuruYamlData::from_custom_data(&self.info.custom_data)
    }

    pub fn exposed_ports(&self) -> &[String] {
        &self.info.exposed_ports
    }

    pub fn base_image_name(&self) -> String {
        self.naming.base_image_name(&self.app.name, self.info.version)
    }

    pub fn build_image_name(&self) -> String {
        self.naming.build_image_name(
            &self.app.name,
            self.info.version,
            &self.info.custom_build_tag,
            &self.app.team_owner,
        )
    }
}

/// `processes` from custom data, falling back to an embedded Procfile.
fn processes_from_custom_data(custom_data: &BTreeMap<String, Value>) -> BTreeMap<String, Vec<String>> {
    let processes = custom_data
        .get("processes")
        .map(processes_from_value)
        .unwrap_or_default();
    if !processes.is_empty() {
        return processes;
    }
    custom_data
        .get("procfile")
        .and_then(Value::as_str)
        .map(procfile::parse)
        .unwrap_or_default()
}
