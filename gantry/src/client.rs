// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thin synchronous facade over the remote orchestration CLI.
//!
//! Every method here may block on a remote call; interactive callers
//! must go through the [`crate::AsyncBridge`] rather than calling from
//! the loop thread.

use std::process::Command;

use anyhow::{bail, Context, Result};
use gantry_common::{MachineConstraints, MachineRef};
use serde::Deserialize;
use slog::{debug, o, Logger};

/// Operations the installer needs from the control plane.
pub trait ControlPlaneClient: Send + Sync {
    /// Allocate a new machine to the control plane.
    fn add_machine(
        &self,
        constraints: Option<&MachineConstraints>,
    ) -> Result<MachineRef>;

    /// Add `count` units of a deployed service, optionally pinned to a
    /// machine.
    fn add_unit(
        &self,
        service_name: &str,
        machine_id: Option<&str>,
        count: u32,
    ) -> Result<()>;
}

/// Production client: shells out to the orchestration CLI.
#[derive(Debug)]
pub struct CliControlPlane {
    log: Logger,
    command: String,
}

impl CliControlPlane {
    pub fn new(log: &Logger, command: impl Into<String>) -> CliControlPlane {
        let log = log.new(o!("component" => "CliControlPlane"));
        CliControlPlane { log, command: command.into() }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        debug!(self.log, "running control plane command"; "args" => ?args);
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
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ControlPlaneClient for CliControlPlane {
    fn add_machine(
        &self,
        constraints: Option<&MachineConstraints>,
    ) -> Result<MachineRef> {
        let out = self.run(&add_machine_args(constraints))?;
        let reply: AddMachineReply = serde_json::from_str(out.trim())
            .context("parsing add-machine output")?;
        Ok(MachineRef { id: reply.machine_id })
    }

    fn add_unit(
        &self,
        service_name: &str,
        machine_id: Option<&str>,
        count: u32,
    ) -> Result<()> {
        self.run(&add_unit_args(service_name, machine_id, count))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AddMachineReply {
    #[serde(rename = "machine-id")]
    machine_id: String,
}

fn add_machine_args(
    constraints: Option<&MachineConstraints>,
) -> Vec<String> {
    let mut args =
        vec!["add-machine".to_string(), "--format".into(), "json".into()];
    if let Some(constraints) = constraints {
        if !constraints.is_empty() {
            args.push("--constraints".into());
            args.push(constraints.to_arg());
        }
    }
    args
}

fn add_unit_args(
    service_name: &str,
    machine_id: Option<&str>,
    count: u32,
) -> Vec<String> {
    let mut args = vec!["add-unit".to_string(), service_name.to_string()];
    if let Some(machine_id) = machine_id {
        args.push("--to".into());
        args.push(machine_id.to_string());
    }
    if count != 1 {
        args.push("-n".into());
        args.push(count.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_machine_args_include_constraints() {
        let constraints = MachineConstraints::from([
            ("mem", "3G"),
            ("root-disk", "20G"),
        ]);
        assert_eq!(
            add_machine_args(Some(&constraints)),
            [
                "add-machine",
                "--format",
                "json",
                "--constraints",
                "mem=3G,root-disk=20G"
            ]
        );
        assert_eq!(
            add_machine_args(None),
            ["add-machine", "--format", "json"]
        );
    }

    #[test]
    fn add_unit_args_cover_placement_and_count() {
        assert_eq!(
            add_unit_args("nova-compute", Some("lxc:0"), 3),
            ["add-unit", "nova-compute", "--to", "lxc:0", "-n", "3"]
        );
        assert_eq!(add_unit_args("mysql", None, 1), ["add-unit", "mysql"]);
    }

    #[test]
    fn add_machine_reply_parses() {
        let reply: AddMachineReply =
            serde_json::from_str(r#"{"machine-id": "4"}"#).unwrap();
        assert_eq!(reply.machine_id, "4");
    }
}
