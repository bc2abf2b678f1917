// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Non-interactive shell commands.
//!
//! These run outside the event loop, so calling the blocking control
//! plane client directly is fine here.

use anyhow::{bail, ensure, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use gantry_common::MachineConstraints;
use slog::Logger;

use crate::charms::registry_from_config;
use crate::client::{CliControlPlane, ControlPlaneClient};
use crate::config::Config;

#[derive(Debug, Parser)]
#[clap(name = "gantry", about = "Cloud control plane installer")]
pub struct App {
    /// Path to the installer configuration.
    #[clap(
        long,
        global = true,
        default_value = "/etc/gantry/config.toml"
    )]
    pub config: Utf8PathBuf,

    #[clap(subcommand)]
    pub command: Option<ShellCommand>,
}

#[derive(Debug, Subcommand)]
pub enum ShellCommand {
    /// Allocate a new machine to the control plane.
    AddMachine {
        /// Machine constraints as comma-separated k=v pairs,
        /// e.g. mem=3G,cpu-cores=2.
        #[clap(long, value_delimiter = ',')]
        constraints: Vec<String>,
    },

    /// Add units of a deployed charm that allows multiple units.
    AddUnit {
        /// Charm to grow.
        charm: String,

        /// Machine to place the units on (e.g. lxc:0).
        #[clap(long)]
        machine: Option<String>,

        /// Number of units to add.
        #[clap(long, default_value_t = 1)]
        count: u32,
    },
}

impl ShellCommand {
    pub fn exec(self, log: &Logger, config: &Config) -> Result<()> {
        let client =
            CliControlPlane::new(log, &config.control_plane.command);
        match self {
            ShellCommand::AddMachine { constraints } => {
                let constraints = parse_constraints(&constraints)?;
                let machine = client.add_machine(
                    (!constraints.is_empty()).then_some(&constraints),
                )?;
                println!("requested machine {}", machine.id);
            }
            ShellCommand::AddUnit { charm, machine, count } => {
                let registry = registry_from_config(log, config);
                let Some(found) = registry.get(&charm) else {
                    bail!("unknown charm {charm}");
                };
                ensure!(
                    found.allow_multi_units(),
                    "charm {charm} does not allow extra units \
                     (charms that do: {})",
                    registry
                        .multi_unit_charms()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                client.add_unit(&charm, machine.as_deref(), count)?;
                println!("added {count} unit(s) of {charm}");
            }
        }
        Ok(())
    }
}

fn parse_constraints(pairs: &[String]) -> Result<MachineConstraints> {
    let mut constraints = MachineConstraints::default();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("malformed constraint {pair:?}, expected k=v");
        };
        constraints.0.insert(key.to_string(), value.to_string());
    }
    Ok(constraints)
}
