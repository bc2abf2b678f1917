// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interactive installer that brings up a multi-node cloud control
//! plane: it acquires a controller machine, deploys a fixed bundle of
//! charms onto it in priority order, wires their relations as each
//! service becomes visible, and keeps polling until the whole bundle
//! is live.

use std::time::Duration;

mod bridge;
mod charm;
mod charms;
mod cli;
mod client;
mod config;
mod dispatch;
mod events;
mod keymap;
mod lock;
mod net;
mod orchestrator;
mod poller;
mod runner;
mod scheduler;
mod screen;

/// One loop tick; countdowns are measured in these.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub use bridge::AsyncBridge;
pub use charm::{Charm, CharmRegistry};
pub use charms::ShellCharm;
pub use client::{CliControlPlane, ControlPlaneClient};
pub use config::{Config, Mode};
pub use dispatch::exec;
pub use events::{Action, Event, View};
pub use keymap::{Cmd, KeyHandler};
pub use lock::{FilePasswordStore, IdleLockGate, PasswordStore};
pub use net::{NetworkConfigurer, SshNetworkConfigurer};
pub use orchestrator::{DeploymentOrchestrator, MachineProvisioner};
pub use poller::{CliSnapshotProvider, SnapshotProvider};
pub use runner::{Runner, State};
pub use scheduler::TickScheduler;
pub use screen::{Screen, TextScreen};
