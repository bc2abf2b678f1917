// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-time host network reconfiguration for single-node installs.
//!
//! The controller's network interface is rewritten to a private bridge
//! subnet so containers created on it land on a routable network, then
//! the host reboots to pick the change up.

use std::process::Command;

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use gantry_common::Machine;
use slog::{info, o, Logger};

/// Rewrites the controller machine's network configuration.
pub trait NetworkConfigurer: Send {
    fn configure_host_bridge(&self, machine: &Machine) -> Result<()>;
}

/// Production configurer: copies a bridge interface template to the
/// host over scp, installs it, and reboots.
#[derive(Debug)]
pub struct SshNetworkConfigurer {
    log: Logger,
    template: Utf8PathBuf,
    remote_user: String,
}

impl SshNetworkConfigurer {
    pub fn new(
        log: &Logger,
        template: Utf8PathBuf,
        remote_user: impl Into<String>,
    ) -> SshNetworkConfigurer {
        let log = log.new(o!("component" => "SshNetworkConfigurer"));
        SshNetworkConfigurer {
            log,
            template,
            remote_user: remote_user.into(),
        }
    }

    fn run(&self, program: &str, args: &[String]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("spawning {program}"))?;
        if !status.success() {
            bail!("{program} {} failed ({status})", args.join(" "));
        }
        Ok(())
    }
}

impl NetworkConfigurer for SshNetworkConfigurer {
    fn configure_host_bridge(&self, machine: &Machine) -> Result<()> {
        let Some(host) = machine.dns_name.as_deref() else {
            bail!("machine {} has no address yet", machine.id);
        };
        info!(
            self.log, "configuring host bridge network";
            "machine_id" => &machine.id,
            "host" => host
        );

        let target = format!("{}@{host}", self.remote_user);
        self.run(
            "scp",
            &[
                "-oStrictHostKeyChecking=no".to_string(),
                self.template.to_string(),
                format!("{target}:/tmp/bridge-host-only"),
            ],
        )?;

        let cmds = [
            "sudo mv /tmp/bridge-host-only \
             /etc/network/interfaces.d/br0.cfg",
            "sudo rm /etc/network/interfaces.d/eth0.cfg",
            "sudo reboot",
        ]
        .join(" && ");
        self.run(
            "ssh",
            &["-oStrictHostKeyChecking=no".to_string(), target, cmds],
        )
    }
}
