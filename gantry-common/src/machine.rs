// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle state reported for a machine or unit agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Pending,
    Started,
    Down,
    Error,
    /// States we don't model explicitly; treated as "not ready".
    #[serde(other)]
    Unknown,
}

impl AgentState {
    pub fn is_started(&self) -> bool {
        matches!(self, AgentState::Started)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentState::Error)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Pending => "pending",
            AgentState::Started => "started",
            AgentState::Down => "down",
            AgentState::Error => "error",
            AgentState::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl Default for AgentState {
    fn default() -> Self {
        AgentState::Pending
    }
}

/// A machine allocated to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Control-plane machine id ("0", "1", ...).
    pub id: String,
    #[serde(rename = "agent-state", default)]
    pub agent_state: AgentState,
    /// Resolvable address of the machine, once it has one.
    #[serde(rename = "dns-name", default)]
    pub dns_name: Option<String>,
}

impl Machine {
    pub fn new(id: impl Into<String>, agent_state: AgentState) -> Machine {
        Machine { id: id.into(), agent_state, dns_name: None }
    }
}

/// A reference to a machine returned by a provisioning call.
///
/// Only the id is guaranteed; the full record shows up in a later
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    pub id: String,
}

/// Constraints passed to `add-machine`, e.g. `mem` -> `3G`.
///
/// A `BTreeMap` so rendered constraint strings are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConstraints(pub BTreeMap<String, String>);

impl MachineConstraints {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a single `k=v,k=v` argument.
    pub fn to_arg(&self) -> String {
        let parts: Vec<String> =
            self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parts.join(",")
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MachineConstraints {
    fn from(pairs: [(&str, &str); N]) -> Self {
        MachineConstraints(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
