//! The `tsuru.yaml` model.
//!
//! Known sections are typed; anything else, at any depth, is kept as raw
//! JSON in the section's `extra` map so it survives a deploy and rollback
//! cycle.
//! The same model is stored in `AppVersionInfo::custom_data`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VersionError, VersionResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TsuruYamlData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startupcheck: Option<Healthcheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<Process>,
    /// Unknown top-level keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Healthcheck {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "match", skip_serializing_if = "String::is_empty")]
    pub match_body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_failures: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_in_router: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_restart: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hooks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartHooks>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartHooks {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Pod group -> process name -> process settings.
    pub groups: BTreeMap<String, BTreeMap<String, KubernetesProcess>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesProcess {
    pub ports: Vec<KubernetesPort>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesPort {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One entry of the `processes` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub name: String,
    pub command: ProcessCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startupcheck: Option<Healthcheck>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A process command: a shell string or an explicit argv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessCommand {
    Shell(String),
    Argv(Vec<String>),
}

impl ProcessCommand {
    pub fn argv(&self) -> Vec<String> {
        match self {
            ProcessCommand::Shell(s) if s.trim().is_empty() => Vec::new(),
            ProcessCommand::Shell(s) => vec![s.clone()],
            ProcessCommand::Argv(v) => v.clone(),
        }
    }
}

impl TsuruYamlData {
    /// Parse `tsuru.yaml` text. Blank input yields the empty model.
    pub fn parse(content: &str) -> VersionResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| VersionError::InvalidYaml(e.to_string()))
    }

    /// Rebuild the model from stored `custom_data`.
    ///
    /// Keys that do not fit the typed sections stay in `extra`. A
    /// `processes` map (as opposed to the list form) is skipped.
    pub fn from_custom_data(custom_data: &BTreeMap<String, Value>) -> VersionResult<Self> {
        let object: serde_json::Map<String, Value> = custom_data
            .iter()
            .filter(|(_, v)| !v.is_null())
            .filter(|(k, v)| k.as_str() != "processes" || v.is_array())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(object))
            .map_err(|e| VersionError::InvalidYaml(e.to_string()))
    }

    /// Flatten into the map stored as `custom_data`.
    pub fn to_custom_data(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(object)) => object.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Processes declared in the `processes` list, entries without a
    /// name or command skipped.
    pub fn process_map(&self) -> BTreeMap<String, Vec<String>> {
        self.processes
            .iter()
            .filter(|p| !p.name.is_empty())
            .filter_map(|p| {
                let argv = p.command.argv();
                (!argv.is_empty()).then(|| (p.name.clone(), argv))
            })
            .collect()
    }
}

/// Keys understood by the healthcheck and startupcheck sections.
pub const CHECK_FIELDS: [&str; 12] = [
    "path",
    "method",
    "scheme",
    "status",
    "headers",
    "match",
    "command",
    "interval_seconds",
    "timeout_seconds",
    "allowed_failures",
    "use_in_router",
    "force_restart",
];

/// `tsuru.yaml` as an untyped map, for input the typed model rejects.
pub fn raw_custom_data(content: &str) -> VersionResult<BTreeMap<String, Value>> {
    match serde_yaml::from_str::<Value>(content) {
        Ok(Value::Object(object)) => Ok(object.into_iter().collect()),
        Ok(Value::Null) => Ok(BTreeMap::new()),
        Ok(_) => Err(VersionError::InvalidYaml("top level is not a mapping".into())),
        Err(e) => Err(VersionError::InvalidYaml(e.to_string())),
    }
}

/// Warnings for unknown or misshapen check sections, globally and per
/// process. Input that does not parse as a mapping yields none.
pub fn check_warnings(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let Ok(root) = raw_custom_data(content) else {
        return warnings;
    };
    lint_check("healthcheck", root.get("healthcheck"), &mut warnings);
    lint_check("startupcheck", root.get("startupcheck"), &mut warnings);
    match root.get("processes") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::Object(process) => {
                        lint_check("healthcheck", process.get("healthcheck"), &mut warnings);
                        lint_check("startupcheck", process.get("startupcheck"), &mut warnings);
                    }
                    _ => warnings.push("WARNING: invalid process configuration on tsuru.yaml".into()),
                }
            }
        }
        Some(_) => warnings.push("WARNING: invalid processes configuration on tsuru.yaml".into()),
    }
    warnings
}

fn lint_check(kind: &str, section: Option<&Value>, warnings: &mut Vec<String>) {
    match section {
        None | Some(Value::Null) => {}
        Some(Value::Object(fields)) => {
            for key in fields.keys().filter(|k| !CHECK_FIELDS.contains(&k.as_str())) {
                warnings.push(format!(
                    "WARNING: invalid or deprecated {kind} field {key:?} found in tsuru.yaml"
                ));
            }
        }
        Some(_) => warnings.push(format!("WARNING: invalid {kind} configuration on tsuru.yaml")),
    }
}

/// Read processes out of a raw `custom_data["processes"]` value.
///
/// Accepts the list form of `tsuru.yaml` and a `name -> command` map,
/// where each command is a string or a list of strings.
pub fn processes_from_value(value: &Value) -> BTreeMap<String, Vec<String>> {
    let mut processes = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (name, command) in map {
                if let Some(argv) = command_argv(command) {
                    processes.insert(name.clone(), argv);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                let argv = item.get("command").and_then(command_argv);
                if let (false, Some(argv)) = (name.is_empty(), argv) {
                    processes.insert(name.to_string(), argv);
                }
            }
        }
        _ => {}
    }
    processes
}

fn command_argv(value: &Value) -> Option<Vec<String>> {
    let argv: Vec<String> = match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => return None,
    };
    (!argv.is_empty()).then_some(argv)
}
