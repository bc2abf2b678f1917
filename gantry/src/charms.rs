// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Config-defined charms.
//!
//! Each charm's lifecycle hooks are argv templates run against the
//! orchestration CLI; the orchestrator itself stays ignorant of the
//! plumbing.

use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gantry_common::Machine;
use slog::{debug, o, Logger};

use crate::charm::{Charm, CharmRegistry};
use crate::config::{CharmDef, Config};

/// A charm whose hooks shell out to the orchestration CLI.
#[derive(Debug)]
pub struct ShellCharm {
    log: Logger,
    def: CharmDef,
    command: String,
}

impl ShellCharm {
    pub fn new(log: &Logger, def: CharmDef, command: &str) -> ShellCharm {
        let log = log.new(o!(
            "component" => "ShellCharm",
            "charm" => def.name.clone(),
        ));
        ShellCharm { log, def, command: command.to_string() }
    }

    fn run(&self, args: &[String]) -> Result<()> {
        debug!(self.log, "running charm hook command"; "args" => ?args);
        let output = Command::new(&self.command)
            .args(args)
            .output()
            .with_context(|| format!("spawning {}", self.command))?;
        if !output.status.success() {
            bail!(
                "{} {} failed ({}): {}",
                self.command,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Charm for ShellCharm {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn deploy_priority(&self) -> i32 {
        self.def.deploy_priority
    }

    fn allow_multi_units(&self) -> bool {
        self.def.allow_multi_units
    }

    fn setup(&self, machine: &Machine) -> Result<()> {
        // Deploy into a container on the controller machine;
        // containers are created on demand.
        let placement = format!("lxc:{}", machine.id);
        self.run(&substitute_placement(&self.def.setup, &placement))
    }

    fn set_relations(&self) -> Result<()> {
        for (a, b) in &self.def.relations {
            self.run(&[
                "add-relation".to_string(),
                a.to_string(),
                b.to_string(),
            ])?;
        }
        Ok(())
    }

    fn post_proc(&self) -> Result<()> {
        match &self.def.post_proc {
            Some(args) => self.run(args),
            None => Ok(()),
        }
    }
}

/// Build the priority-ordered registry from the configured bundle.
pub fn registry_from_config(log: &Logger, config: &Config) -> CharmRegistry {
    let charms: Vec<Arc<dyn Charm>> = config
        .charms
        .iter()
        .map(|def| {
            Arc::new(ShellCharm::new(
                log,
                def.clone(),
                &config.control_plane.command,
            )) as Arc<dyn Charm>
        })
        .collect();
    CharmRegistry::new(charms)
}

fn substitute_placement(args: &[String], placement: &str) -> Vec<String> {
    args.iter().map(|a| a.replace("{machine}", placement)).collect()
}
