// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Installer configuration, read once at startup from a TOML file.

use anyhow::{ensure, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Whether the whole control plane lands on one machine or spreads
/// over PXE-booted infrastructure machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub mode: Mode,

    /// Seconds between state polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds of idle input before the screen locks.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: u64,

    /// File holding the single-line lock password.
    pub password_file: Utf8PathBuf,

    /// Bridge interface template copied to a single-node host.
    #[serde(default = "default_network_template")]
    pub network_template: Utf8PathBuf,

    /// Remote account used for the single-node network rewrite.
    #[serde(default = "default_remote_user")]
    pub remote_user: String,

    pub control_plane: ControlPlaneConfig,

    /// Only meaningful in multi-node mode.
    #[serde(default)]
    pub infrastructure: Option<InfrastructureConfig>,

    pub charms: Vec<CharmDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ControlPlaneConfig {
    /// The orchestration CLI binary.
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct InfrastructureConfig {
    /// The infrastructure-layer CLI binary.
    pub command: String,
}

/// One charm of the bundle: identity, ordering, and the CLI plumbing
/// behind its lifecycle hooks.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CharmDef {
    pub name: String,

    /// Lower deploys first; ties keep file order.
    pub deploy_priority: i32,

    #[serde(default)]
    pub allow_multi_units: bool,

    /// Argv passed to the orchestration CLI to deploy the charm.
    /// `{machine}` is replaced by the container placement on the
    /// controller machine.
    pub setup: Vec<String>,

    /// Relation endpoint pairs, each wired with `add-relation`.
    #[serde(default)]
    pub relations: Vec<(String, String)>,

    /// Optional argv run once after relations are in place.
    #[serde(default)]
    pub post_proc: Option<Vec<String>>,
}

impl Config {
    pub fn from_file(path: &Utf8Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {path}"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {path}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.charms.is_empty(), "no charms configured");
        if self.mode == Mode::Multi {
            ensure!(
                self.infrastructure.is_some(),
                "multi-node mode requires an [infrastructure] section"
            );
        }
        for charm in &self.charms {
            ensure!(
                !charm.setup.is_empty(),
                "charm {} has an empty setup command",
                charm.name
            );
        }
        Ok(())
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_lock_timeout() -> u64 {
    120
}

fn default_network_template() -> Utf8PathBuf {
    "/usr/share/gantry/templates/bridge-host-only".into()
}

fn default_remote_user() -> String {
    "ubuntu".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        mode = "multi"
        poll-interval = 5
        password-file = "/etc/gantry/lock.passwd"

        [control-plane]
        command = "cpctl"

        [infrastructure]
        command = "infractl"

        [[charms]]
        name = "mysql"
        deploy-priority = 10
        setup = ["deploy", "mysql", "--to", "{machine}"]
        relations = [["mysql", "keystone"]]

        [[charms]]
        name = "nova-compute"
        deploy-priority = 20
        allow-multi-units = true
        setup = ["deploy", "nova-compute", "--to", "{machine}"]
        post-proc = ["run", "--unit", "nova-compute/0", "sync-images"]
    "#;

    #[test]
    fn example_config_parses() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mode, Mode::Multi);
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.lock_timeout, 120, "default applies");
        assert_eq!(config.charms.len(), 2);
        assert!(config.charms[1].allow_multi_units);
        assert_eq!(
            config.charms[0].relations,
            [("mysql".to_string(), "keystone".to_string())]
        );
    }

    #[test]
    fn multi_mode_requires_infrastructure_section() {
        let mut config: Config = toml::from_str(EXAMPLE).unwrap();
        config.infrastructure = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let doc = format!("{EXAMPLE}\nsurprise = true\n");
        assert!(toml::from_str::<Config>(&doc).is_err());
    }
}
