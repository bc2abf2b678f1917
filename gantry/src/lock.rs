// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Idle lock: after a period with no input, the active view is swapped
//! for a credential gate and restored on successful unlock.

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use slog::{info, o, warn, Logger};

use crate::events::View;
use crate::keymap::Cmd;

/// Checks an entered password against the stored one.
pub trait PasswordStore: Send {
    /// `Ok(true)` on a match, `Ok(false)` on a mismatch, `Err` if the
    /// store itself is unreadable.
    fn verify(&self, entered: &str) -> Result<bool>;
}

/// Password stored as exactly one line in a file, as written by the
/// install-time configuration step.
#[derive(Debug)]
pub struct FilePasswordStore {
    path: Utf8PathBuf,
}

impl FilePasswordStore {
    pub fn new(path: Utf8PathBuf) -> FilePasswordStore {
        FilePasswordStore { path }
    }
}

impl PasswordStore for FilePasswordStore {
    fn verify(&self, entered: &str) -> Result<bool> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("problem accessing {}", self.path))?;
        let mut lines = contents.lines().filter(|l| !l.is_empty());
        let (Some(password), None) = (lines.next(), lines.next()) else {
            bail!(
                "{} must contain exactly one line that is the lock password",
                self.path
            );
        };
        Ok(password == entered)
    }
}

/// The idle countdown plus the credential gate it installs.
///
/// The runner forwards every input event through [`on_input`], ticks
/// the gate once per second, and routes commands here while the gate
/// is locked.
///
/// [`on_input`]: IdleLockGate::on_input
pub struct IdleLockGate {
    log: Logger,
    lock_after: u64,
    ticks_left: u64,
    locked: bool,
    entry: String,
    feedback: Option<String>,
    saved_view: Option<View>,
    store: Box<dyn PasswordStore>,
}

impl IdleLockGate {
    pub const LOCKED_PROMPT: &'static str =
        "The screen is locked. Please enter the password you chose \
         during installation.";

    const INVALID: &'static str = "Invalid password.";

    pub fn new(
        log: &Logger,
        lock_after: u64,
        store: Box<dyn PasswordStore>,
    ) -> IdleLockGate {
        let log = log.new(o!("component" => "IdleLockGate"));
        IdleLockGate {
            log,
            lock_after,
            // Start at zero: the session comes up locked until the
            // operator proves presence once.
            ticks_left: 0,
            locked: false,
            entry: String::new(),
            feedback: None,
            saved_view: None,
            store,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Any input event proves presence and resets the countdown.
    pub fn on_input(&mut self) {
        self.ticks_left = self.lock_after;
    }

    /// Advance the idle countdown; at zero, capture the current view
    /// and install the credential gate.
    pub fn tick(&mut self, view: &mut View) {
        if self.locked {
            return;
        }
        if self.ticks_left == 0 {
            info!(self.log, "idle timeout reached, locking");
            self.locked = true;
            self.entry.clear();
            self.feedback = None;
            self.saved_view = Some(*view);
            *view = View::Locked;
        } else {
            self.ticks_left -= 1;
        }
    }

    /// Handle one command while locked. `installer_done` is consulted
    /// on unlock: if the orchestrator finished while we were locked,
    /// the stale install-progress view is bypassed in favor of the
    /// main view.
    pub fn handle_cmd(
        &mut self,
        cmd: Cmd,
        view: &mut View,
        installer_done: bool,
    ) {
        match cmd {
            Cmd::Char(c) => self.entry.push(c),
            Cmd::Backspace => {
                self.entry.pop();
            }
            Cmd::Enter => self.try_unlock(view, installer_done),
            Cmd::Refresh => {}
        }
    }

    fn try_unlock(&mut self, view: &mut View, installer_done: bool) {
        let entered = std::mem::take(&mut self.entry);
        match self.store.verify(&entered) {
            Ok(true) => {
                let restored = match self.saved_view.take() {
                    Some(View::Installer) if installer_done => View::Main,
                    Some(saved) => saved,
                    None => View::Main,
                };
                *view = restored;
                self.locked = false;
                self.feedback = None;
                self.ticks_left = self.lock_after;
            }
            Ok(false) => {
                self.feedback = Some(Self::INVALID.to_string());
            }
            Err(error) => {
                warn!(
                    self.log, "could not verify password";
                    "error" => #%error
                );
                self.feedback = Some(format!("{error:#}"));
            }
        }
    }

    /// Masked rendering of the pending entry.
    pub fn masked_entry(&self) -> String {
        "*".repeat(self.entry.chars().count())
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }
}
