// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use gantry_common::{MachineRef, PollResult};

use crate::keymap::Cmd;

/// An event that will update state in the [`crate::Runner`].
///
/// This can be a keypress, a timer tick, or the completed result of a
/// bridged call delivered back onto the loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An input event from the terminal translated to a Cmd
    Term(Cmd),

    /// A completed snapshot poll. A failed poll delivers the default
    /// (empty) result: the orchestrator sees no new information.
    Snapshot(PollResult),

    /// A completed `add-machine` provisioning call. `None` means the
    /// call failed; the machine shows up in a later snapshot if it
    /// succeeded.
    MachineAdded(Option<MachineRef>),

    /// The tick of a timer; drives countdowns and the idle lock.
    Tick,

    /// A terminal resize event
    Resize { width: u16, height: u16 },

    /// ctrl-c was pressed
    Shutdown,
}

/// Instructions for the [`crate::Runner`].
///
/// Handling an [`Event`] returns an [`Action`] telling the runner what
/// to do next, keeping event interpretation separate from the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Redraw,
    Quit,
}

/// Which view the presentation layer should be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// The install-progress overlay, shown while the orchestrator is
    /// still working.
    Installer,

    /// The main service listing, shown once the bundle is live.
    Main,

    /// The credential gate installed by the idle lock.
    Locked,
}
