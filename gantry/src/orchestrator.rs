// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The deployment state machine.
//!
//! [`DeploymentOrchestrator::process`] consumes one snapshot per tick
//! and advances the bundle from "nothing deployed" to "fully deployed
//! and related". Progress lives only in memory and only grows: the
//! deployed and finalized sets are append-only, and deployment is
//! idempotent by checking the snapshot for already-existing services
//! rather than by remembering what it asked for.
//!
//! Nothing in here returns an error to the caller. A charm hook that
//! fails is logged and counted as progress anyway (the optimistic
//! progress policy): the installer never gets stuck, at the cost of
//! never retrying a failed hook.

use std::collections::BTreeSet;
use std::sync::Arc;

use gantry_common::{InfraSnapshot, Machine, PollResult, Snapshot};
use slog::{debug, info, o, warn, Logger};

use crate::charm::{Charm, CharmRegistry};
use crate::config::Mode;
use crate::net::NetworkConfigurer;

/// Issues a non-blocking request to allocate a machine. The production
/// implementation dispatches `add-machine` through the bridge; the
/// result shows up in a later snapshot.
pub trait MachineProvisioner: Send {
    fn request_add_machine(&self);
}

pub struct DeploymentOrchestrator {
    log: Logger,
    mode: Mode,
    registry: CharmRegistry,
    provisioner: Box<dyn MachineProvisioner>,
    net: Box<dyn NetworkConfigurer>,

    /// The machine chosen to host the bundle, once one qualifies.
    controller: Option<Machine>,
    deployed: BTreeSet<String>,
    finalized: BTreeSet<String>,
    /// Latch for the one-shot single-node network rewrite.
    network_configured: bool,
    /// Latched once `process` first returns false.
    done: bool,
    status: String,
}

impl DeploymentOrchestrator {
    const PXE_BOOT: &'static str =
        "You need one machine to act as the cloud controller. \
         Please PXE boot the machine you would like to use.";

    const NODE_WAIT: &'static str =
        "Please wait while the cloud controller is installed on your \
         host system.";

    const NO_MACHINES: &'static str =
        "No machines allocated to the control plane. \
         Please PXE boot a machine.";

    const ADDING_MACHINE: &'static str =
        "Adding infrastructure machine to the control plane";

    const MACHINE_WAIT: &'static str =
        "Waiting for a machine to become ready.";

    const DEPLOYING: &'static str = "Deploying charms";

    const SETTING_RELATIONS: &'static str = "Setting charm relations";

    const COMPLETE: &'static str = "Deployment complete";

    pub fn new(
        log: &Logger,
        mode: Mode,
        registry: CharmRegistry,
        provisioner: Box<dyn MachineProvisioner>,
        net: Box<dyn NetworkConfigurer>,
    ) -> DeploymentOrchestrator {
        let log = log.new(o!("component" => "DeploymentOrchestrator"));
        let status = match mode {
            Mode::Single => Self::NODE_WAIT,
            Mode::Multi => Self::PXE_BOOT,
        };
        DeploymentOrchestrator {
            log,
            mode,
            registry,
            provisioner,
            net,
            controller: None,
            deployed: BTreeSet::new(),
            finalized: BTreeSet::new(),
            network_configured: false,
            done: false,
            status: status.to_string(),
        }
    }

    /// Advance deployment against one snapshot. Returns true while
    /// there is still work to do; once it has returned false it keeps
    /// returning false without re-running any pass.
    ///
    /// Not reentrant: the runner only calls this from the loop thread.
    pub fn process(&mut self, poll: &PollResult) -> bool {
        if self.done {
            return false;
        }

        let continuing = self.advance(&poll.snapshot, &poll.infra);
        if !continuing {
            self.done = true;
            self.status = Self::COMPLETE.to_string();
            info!(self.log, "charm setup done");
        }
        continuing
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// User-visible description of what the orchestrator is waiting on.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn controller_machine(&self) -> Option<&Machine> {
        self.controller.as_ref()
    }

    fn advance(&mut self, snapshot: &Snapshot, infra: &InfraSnapshot) -> bool {
        if self.controller.is_none() {
            let Some(machine) = self.acquire_controller(snapshot, infra)
            else {
                return true; // keep polling
            };

            if self.mode == Mode::Single && !self.network_configured {
                self.configure_host_network(&machine);
            }

            debug!(
                self.log, "starting install";
                "machine_id" => &machine.id
            );
            self.controller = Some(machine);
        }

        let Some(machine) = self.controller.clone() else {
            return true;
        };

        self.deploy_charms(snapshot, &machine);
        self.finalize_charms(snapshot);

        debug!(
            self.log, "end of process pass";
            "deployed" => ?self.deployed,
            "finalized" => ?self.finalized
        );

        self.finalized.len() != self.registry.len()
    }

    /// Pick the controller machine, or return None while no machine
    /// qualifies yet (with the status string saying why).
    fn acquire_controller(
        &mut self,
        snapshot: &Snapshot,
        infra: &InfraSnapshot,
    ) -> Option<Machine> {
        let allocated = snapshot.machines_allocated();
        debug!(self.log, "allocated machines"; "machines" => ?allocated);

        match self.mode {
            Mode::Multi => {
                let infra_allocated = infra.machines_allocated();
                if allocated.is_empty() && infra_allocated.is_empty() {
                    debug!(self.log, "{}", Self::NO_MACHINES);
                    self.status = Self::NO_MACHINES.to_string();
                    None
                } else if allocated.is_empty() {
                    // The infrastructure layer has a machine the
                    // control plane hasn't claimed yet.
                    self.status = Self::ADDING_MACHINE.to_string();
                    self.provisioner.request_add_machine();
                    None
                } else {
                    self.first_started(snapshot)
                }
            }
            Mode::Single => self.first_started(snapshot),
        }
    }

    fn first_started(&mut self, snapshot: &Snapshot) -> Option<Machine> {
        match snapshot.first_started_machine() {
            Some(machine) => Some(machine.clone()),
            None => {
                self.status = Self::MACHINE_WAIT.to_string();
                None
            }
        }
    }

    /// Runs at most once, even if the rewrite fails; a failure is
    /// logged, never retried, and never escalated.
    fn configure_host_network(&mut self, machine: &Machine) {
        if let Err(error) = self.net.configure_host_bridge(machine) {
            warn!(
                self.log, "host network configuration failed";
                "machine_id" => &machine.id,
                "error" => #%error
            );
        }
        self.network_configured = true;
    }

    fn deploy_charms(&mut self, snapshot: &Snapshot, machine: &Machine) {
        let undeployed: Vec<Arc<dyn Charm>> = self
            .registry
            .iter()
            .filter(|c| !self.deployed.contains(c.name()))
            .cloned()
            .collect();
        if undeployed.is_empty() {
            return;
        }

        self.status = Self::DEPLOYING.to_string();
        for charm in undeployed {
            let name = charm.name().to_string();

            // Idempotency check against ground truth: if the service
            // already exists we must not call setup again.
            if snapshot.has_service(&name) {
                debug!(
                    self.log, "charm already deployed, skipping";
                    "charm" => &name
                );
                self.deployed.insert(name);
                continue;
            }

            debug!(self.log, "deploying charm"; "charm" => &name);
            if let Err(error) = charm.setup(machine) {
                // Optimistic progress: mark deployed regardless, so a
                // broken hook can't wedge the whole install. The charm
                // will not be retried.
                warn!(
                    self.log, "charm setup failed, marking deployed";
                    "charm" => &name,
                    "error" => #%error
                );
            }
            self.deployed.insert(name);
        }
    }

    fn finalize_charms(&mut self, snapshot: &Snapshot) {
        let unfinalized: Vec<Arc<dyn Charm>> = self
            .registry
            .iter()
            .filter(|c| {
                self.deployed.contains(c.name())
                    && !self.finalized.contains(c.name())
            })
            .cloned()
            .collect();
        if unfinalized.is_empty() {
            return;
        }

        self.status = Self::SETTING_RELATIONS.to_string();
        for charm in unfinalized {
            let name = charm.name().to_string();

            if snapshot.service(&name).is_none() {
                // The control plane doesn't see the service yet, so
                // defer its relations to a later tick.
                debug!(
                    self.log, "service not up yet for charm";
                    "charm" => &name
                );
                continue;
            }

            debug!(self.log, "setting relations"; "charm" => &name);
            if let Err(error) = charm.set_relations() {
                warn!(
                    self.log, "set_relations failed, continuing";
                    "charm" => &name,
                    "error" => #%error
                );
            }
            if let Err(error) = charm.post_proc() {
                warn!(
                    self.log, "post_proc failed, continuing";
                    "charm" => &name,
                    "error" => #%error
                );
            }
            self.finalized.insert(name);
        }
    }
}
