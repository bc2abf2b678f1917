// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point-in-time views of cluster state.
//!
//! The wire shape of a status document keys machines by id and
//! services by name. We flatten those maps into sorted vectors so
//! every consumer iterates in a deterministic order.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::machine::{AgentState, Machine};
use crate::service::{Service, Unit};

#[derive(Debug, thiserror::Error)]
pub enum StateParseError {
    #[error("parsing status document")]
    Json(#[from] serde_json::Error),
}

/// An immutable view of control-plane state at one poll instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    machines: Vec<Machine>,
    services: Vec<Service>,
}

impl Snapshot {
    pub fn new(machines: Vec<Machine>, services: Vec<Service>) -> Snapshot {
        Snapshot { machines, services }
    }

    /// Parse the control plane's `status --format json` output.
    pub fn from_status_json(doc: &str) -> Result<Snapshot, StateParseError> {
        let wire: WireStatus = serde_json::from_str(doc)?;
        Ok(wire.into())
    }

    /// Machines allocated to the control plane.
    pub fn machines_allocated(&self) -> &[Machine] {
        &self.machines
    }

    /// The first allocated machine whose agent has started.
    pub fn first_started_machine(&self) -> Option<&Machine> {
        self.machines.iter().find(|m| m.agent_state.is_started())
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.service(name).is_some()
    }
}

/// Machines visible at the infrastructure layer (enlisted or PXE
/// booted), before they are handed to the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfraSnapshot {
    machines: Vec<Machine>,
}

impl InfraSnapshot {
    pub fn new(machines: Vec<Machine>) -> InfraSnapshot {
        InfraSnapshot { machines }
    }

    /// Parse the infrastructure CLI's machine listing.
    pub fn from_json(doc: &str) -> Result<InfraSnapshot, StateParseError> {
        let wire: WireInfra = serde_json::from_str(doc)?;
        let machines = wire
            .machines
            .into_iter()
            .map(|(id, m)| m.into_machine(id))
            .collect();
        Ok(InfraSnapshot { machines })
    }

    pub fn machines_allocated(&self) -> &[Machine] {
        &self.machines
    }
}

/// One poll of both state providers, delivered over the event channel.
///
/// The `Default` value (empty snapshots, `fresh` false) is what the
/// loop sees when a bridged poll fails: no new information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    pub snapshot: Snapshot,
    pub infra: InfraSnapshot,
    /// True only for a poll that actually completed. An empty fresh
    /// result means the cluster really is empty; a non-fresh result
    /// means nothing was learned and must not drive decisions that
    /// assume an empty cluster.
    pub fresh: bool,
}

impl PollResult {
    /// A completed poll carrying real state.
    pub fn new(snapshot: Snapshot, infra: InfraSnapshot) -> PollResult {
        PollResult { snapshot, infra, fresh: true }
    }
}

#[derive(Debug, Deserialize)]
struct WireMachine {
    #[serde(rename = "agent-state", default)]
    agent_state: AgentState,
    #[serde(rename = "dns-name", default)]
    dns_name: Option<String>,
}

impl WireMachine {
    fn into_machine(self, id: String) -> Machine {
        Machine { id, agent_state: self.agent_state, dns_name: self.dns_name }
    }
}

#[derive(Debug, Deserialize)]
struct WireUnit {
    #[serde(rename = "agent-state", default)]
    agent_state: AgentState,
    #[serde(rename = "public-address", default)]
    public_address: Option<String>,
    #[serde(rename = "agent-state-info", default)]
    agent_state_info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireService {
    #[serde(default)]
    units: BTreeMap<String, WireUnit>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    machines: BTreeMap<String, WireMachine>,
    #[serde(default)]
    services: BTreeMap<String, WireService>,
}

#[derive(Debug, Deserialize)]
struct WireInfra {
    #[serde(default)]
    machines: BTreeMap<String, WireMachine>,
}

impl From<WireStatus> for Snapshot {
    fn from(wire: WireStatus) -> Snapshot {
        let machines = wire
            .machines
            .into_iter()
            .map(|(id, m)| m.into_machine(id))
            .collect();
        let services = wire
            .services
            .into_iter()
            .map(|(name, s)| Service {
                name,
                units: s
                    .units
                    .into_iter()
                    .map(|(name, u)| Unit {
                        name,
                        agent_state: u.agent_state,
                        public_address: u.public_address,
                        agent_state_info: u.agent_state_info,
                    })
                    .collect(),
            })
            .collect();
        Snapshot { machines, services }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{
        "machines": {
            "1": { "agent-state": "pending" },
            "0": { "agent-state": "started", "dns-name": "10.0.4.2" }
        },
        "services": {
            "mysql": {
                "units": {
                    "mysql/0": {
                        "agent-state": "error",
                        "public-address": "10.0.4.10",
                        "agent-state-info": "hook failed: install"
                    }
                }
            },
            "keystone": {}
        }
    }"#;

    #[test]
    fn status_document_round_trips_into_model() {
        let snapshot = Snapshot::from_status_json(STATUS).unwrap();

        // BTreeMap keys give us sorted machine/service order.
        let machines = snapshot.machines_allocated();
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].id, "0");
        assert_eq!(machines[0].dns_name.as_deref(), Some("10.0.4.2"));

        let started = snapshot.first_started_machine().unwrap();
        assert_eq!(started.id, "0");

        assert!(snapshot.has_service("keystone"));
        assert!(!snapshot.has_service("nova-compute"));

        let mysql = snapshot.service("mysql").unwrap();
        assert_eq!(mysql.units.len(), 1);
        let unit = &mysql.units[0];
        assert_eq!(unit.name, "mysql/0");
        assert!(unit.agent_state.is_error());
        assert_eq!(
            unit.agent_state_info.as_deref(),
            Some("hook failed: install")
        );
    }

    #[test]
    fn empty_documents_parse() {
        let snapshot = Snapshot::from_status_json("{}").unwrap();
        assert!(snapshot.machines_allocated().is_empty());
        assert!(snapshot.services().is_empty());
        assert!(snapshot.first_started_machine().is_none());

        let infra = InfraSnapshot::from_json("{}").unwrap();
        assert!(infra.machines_allocated().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(Snapshot::from_status_json("not json").is_err());
    }
}
