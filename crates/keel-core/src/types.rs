//! Descriptors shared across Keel crates.
//!
//! These are read-only views of platform objects owned elsewhere (the
//! app and job catalogs, the event log). The control-plane core only
//! needs the fields below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An application as seen by the build and version subsystems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub team_owner: String,
    pub pool: String,
    /// Environment variables handed to the build agent.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team_owner = team.into();
        self
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = pool.into();
        self
    }
}

/// A job whose image is built on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub pool: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The event under which a build runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub unique_id: String,
}

impl Event {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
        }
    }
}
