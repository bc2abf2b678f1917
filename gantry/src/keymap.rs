// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A mapping of keys to commands interpreted by the runner.
//!
//! Keeping the translation here decouples key bindings from behavior:
//! the lock gate consumes `Char`/`Backspace`/`Enter` while locked, and
//! the runner interprets the same commands differently when unlocked.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// All commands handled by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Force the next tick to poll immediately.
    Refresh,

    /// Confirm; submits the password while the screen is locked.
    Enter,

    /// Delete the last character of pending input.
    Backspace,

    /// A printable character. `q` quits when unlocked; everything
    /// feeds password entry while locked.
    Char(char),
}

/// Translates raw key events into [`Cmd`]s.
///
/// Stateless today; it exists so key sequences or an insert mode can
/// be added without touching the runner.
#[derive(Debug, Default)]
pub struct KeyHandler {}

impl KeyHandler {
    pub fn on(&mut self, event: KeyEvent) -> Option<Cmd> {
        let cmd = match event.code {
            KeyCode::Enter => Cmd::Enter,
            KeyCode::Backspace => Cmd::Backspace,
            KeyCode::F(5) => Cmd::Refresh,
            KeyCode::Char(c) => Cmd::Char(c),
            _ => return None,
        };
        Some(cmd)
    }
}

/// ctrl-c always shuts the installer down, locked or not.
pub fn is_control_c(key_event: &KeyEvent) -> bool {
    key_event.code == KeyCode::Char('c')
        && key_event.modifiers == KeyModifiers::CONTROL
}
