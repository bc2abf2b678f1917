// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared data model for the gantry installer.
//!
//! These types are the installer's read-only view of the cluster:
//! machines and services as reported by the control plane, plus the
//! raw machine inventory reported by the infrastructure layer. The
//! orchestrator consumes them and never mutates them.

mod machine;
mod service;
mod snapshot;

pub use machine::{AgentState, Machine, MachineConstraints, MachineRef};
pub use service::{Service, Unit};
pub use snapshot::{InfraSnapshot, PollResult, Snapshot, StateParseError};
