// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-demand polling of cluster state.
//!
//! Polling is caller-initiated: the scheduler decides when to poll and
//! dispatches the (blocking) poll through the bridge.

use std::process::Command;

use anyhow::{bail, Context, Result};
use gantry_common::{InfraSnapshot, PollResult, Snapshot};
use slog::{debug, o, Logger};

/// Produces a point-in-time view of control-plane and infrastructure
/// state. May block; must only be invoked through the bridge.
pub trait SnapshotProvider: Send + Sync {
    fn poll(&self) -> Result<PollResult>;
}

/// Production provider: asks the orchestration CLI (and, in multi-node
/// mode, the infrastructure CLI) for a status document.
#[derive(Debug)]
pub struct CliSnapshotProvider {
    log: Logger,
    status_command: String,
    infra_command: Option<String>,
}

impl CliSnapshotProvider {
    pub fn new(
        log: &Logger,
        status_command: impl Into<String>,
        infra_command: Option<String>,
    ) -> CliSnapshotProvider {
        let log = log.new(o!("component" => "CliSnapshotProvider"));
        CliSnapshotProvider {
            log,
            status_command: status_command.into(),
            infra_command,
        }
    }

    fn run(&self, command: &str, args: &[&str]) -> Result<String> {
        debug!(self.log, "polling"; "command" => command, "args" => ?args);
        let output = Command::new(command)
            .args(args)
            .output()
            .with_context(|| format!("spawning {command}"))?;
        if !output.status.success() {
            bail!(
                "{command} {} failed ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SnapshotProvider for CliSnapshotProvider {
    fn poll(&self) -> Result<PollResult> {
        let doc =
            self.run(&self.status_command, &["status", "--format", "json"])?;
        let snapshot = Snapshot::from_status_json(&doc)
            .context("parsing control-plane status")?;

        // Single-node installs have no separate infrastructure layer.
        let infra = match &self.infra_command {
            Some(command) => {
                let doc = self
                    .run(command, &["list-machines", "--format", "json"])?;
                InfraSnapshot::from_json(&doc)
                    .context("parsing infrastructure machine list")?
            }
            None => InfraSnapshot::default(),
        };

        Ok(PollResult::new(snapshot, infra))
    }
}
