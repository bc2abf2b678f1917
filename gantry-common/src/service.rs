// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::machine::AgentState;

/// A single unit of a deployed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit name, e.g. `mysql/0`.
    pub name: String,
    #[serde(rename = "agent-state", default)]
    pub agent_state: AgentState,
    #[serde(rename = "public-address", default)]
    pub public_address: Option<String>,
    /// Extra detail the agent reports when it is in an error state.
    #[serde(rename = "agent-state-info", default)]
    pub agent_state_info: Option<String>,
}

/// A running instance of a charm, with its units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub units: Vec<Unit>,
}

impl Service {
    /// Units currently reporting an error state.
    pub fn errored_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| u.agent_state.is_error())
    }
}
