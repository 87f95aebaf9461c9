//! Reconciliation of build-time metadata into version data.
//!
//! Process sources are merged in order: `tsuru.yaml` `processes`, then
//! the Procfile, then the image `ENTRYPOINT` + `CMD` as a single `web`
//! process. An earlier source keeps a name a later source also defines.

use std::collections::BTreeMap;

use keel_version::{AddVersionData, TsuruYamlData, procfile, yaml};

use crate::error::{BuildError, BuildResult};
use crate::proto::TsuruConfig;

/// Name given to the process synthesized from the image config.
pub const WEB_PROCESS: &str = "web";

/// A line of build output produced while reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    /// Written as a ` ---> ` action line.
    Action(String),
    /// Written as-is.
    Verbatim(String),
}

impl Note {
    pub fn text(&self) -> &str {
        match self {
            Note::Action(text) | Note::Verbatim(text) => text,
        }
    }
}

/// Version data plus the progress notes produced while deriving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub data: AddVersionData,
    pub notes: Vec<Note>,
}

/// Derive version data from the agent's `TsuruConfig`.
///
/// A missing config is treated as an empty one. A `tsuru.yaml` the typed
/// model rejects is stored as its raw mapping; one that is not YAML at
/// all is reported in the notes and otherwise ignored. The only hard
/// failure is ending up with no process at all.
pub fn reconcile(config: Option<&TsuruConfig>) -> BuildResult<Reconciled> {
    let empty = TsuruConfig::default();
    let tc = config.unwrap_or(&empty);
    let mut notes = Vec::new();

    let mut custom_data = None;
    let mut yaml_processes = BTreeMap::new();
    let mut global_healthcheck = false;
    if !tc.tsuru_yaml.trim().is_empty() {
        notes.push(Note::Action("Tsuru config file (tsuru.yaml) found".into()));
        notes.push(Note::Verbatim(tc.tsuru_yaml.trim_end().to_string()));
        match TsuruYamlData::parse(&tc.tsuru_yaml) {
            Ok(parsed) => {
                yaml_processes = parsed.process_map();
                global_healthcheck = parsed.healthcheck.is_some();
                custom_data = Some(parsed.to_custom_data());
            }
            Err(e) => match yaml::raw_custom_data(&tc.tsuru_yaml) {
                Ok(raw) => {
                    notes.push(Note::Action(format!("WARNING: tsuru.yaml stored as-is: {e}")));
                    yaml_processes = raw
                        .get("processes")
                        .filter(|p| p.is_array())
                        .map(yaml::processes_from_value)
                        .unwrap_or_default();
                    global_healthcheck = raw.get("healthcheck").is_some_and(|h| !h.is_null());
                    custom_data = Some(raw);
                }
                Err(_) => notes.push(Note::Action(format!("WARNING: ignoring tsuru.yaml: {e}"))),
            },
        }
        notes.extend(yaml::check_warnings(&tc.tsuru_yaml).into_iter().map(Note::Action));
    }

    let mut processes: BTreeMap<String, (Vec<String>, &'static str)> = BTreeMap::new();
    if !yaml_processes.is_empty() {
        notes.push(Note::Action("Using 'processes' configuration from tsuru.yaml".into()));
        if global_healthcheck {
            notes.push(Note::Action(
                "WARNING: Global healthcheck configuration will be IGNORED when YML contains 'processes' configuration"
                    .into(),
            ));
        }
        merge(&mut processes, yaml_processes, "tsuru.yaml");
        if !tc.procfile.trim().is_empty() {
            notes.push(Note::Action(
                "WARNING: Individual Procfile processes will be IGNORED when YML defines the same process configuration (name and command)"
                    .into(),
            ));
        }
    }
    if !tc.procfile.trim().is_empty() {
        merge(&mut processes, procfile::parse(&tc.procfile), "Procfile");
    }

    if processes.is_empty() {
        notes.push(Note::Action(
            "neither the Procfile nor the processes commands in tsuru.yaml were found; using ENTRYPOINT and CMD defined in the image instead."
                .into(),
        ));
        let argv: Vec<String> = tc
            .image_config
            .iter()
            .flat_map(|ic| ic.entrypoint.iter().chain(ic.cmd.iter()))
            .cloned()
            .collect();
        if argv.is_empty() {
            return Err(BuildError::NoProcesses);
        }
        processes.insert(WEB_PROCESS.to_string(), (argv, "image"));
    }

    for (name, (argv, source)) in &processes {
        notes.push(Note::Action(format!(
            "Process {name:?} found with commands: {argv:?} (defined in: {source:?})"
        )));
    }

    let exposed_ports = tc
        .image_config
        .as_ref()
        .map(|ic| ic.exposed_ports.clone())
        .unwrap_or_default();

    Ok(Reconciled {
        data: AddVersionData {
            processes: processes
                .into_iter()
                .map(|(name, (argv, _))| (name, argv))
                .collect(),
            custom_data,
            exposed_ports,
        },
        notes,
    })
}

fn merge(
    into: &mut BTreeMap<String, (Vec<String>, &'static str)>,
    from: BTreeMap<String, Vec<String>>,
    source: &'static str,
) {
    for (name, argv) in from {
        into.entry(name).or_insert((argv, source));
    }
}
