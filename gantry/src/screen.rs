// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The presentation seam.
//!
//! Rendering proper is not this crate's business; the runner only
//! needs something it can hand the current [`State`] to after each
//! event. [`TextScreen`] is a minimal terminal rendering so the binary
//! is usable on its own.

use std::io::Write;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::events::View;
use crate::lock::IdleLockGate;
use crate::runner::State;

pub trait Screen: Send {
    fn draw(&mut self, state: &State) -> Result<()>;
}

/// Plain full-screen text rendering.
pub struct TextScreen {
    out: std::io::Stdout,
}

impl TextScreen {
    pub fn new() -> TextScreen {
        TextScreen { out: std::io::stdout() }
    }
}

impl Default for TextScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for TextScreen {
    fn draw(&mut self, state: &State) -> Result<()> {
        self.out.queue(Clear(ClearType::All))?.queue(MoveTo(0, 0))?;
        for (row, line) in render_lines(state).iter().enumerate() {
            self.out.queue(MoveTo(0, row as u16))?;
            self.out.write_all(line.as_bytes())?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn render_lines(state: &State) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("Gantry Cloud Installer".to_string());
    lines.push(String::new());

    match state.view {
        View::Locked => {
            lines.push(IdleLockGate::LOCKED_PROMPT.to_string());
            if let Some(feedback) = &state.lock_feedback {
                lines.push(feedback.clone());
            }
            lines.push(format!("Password: {}", state.lock_entry));
        }
        View::Installer => {
            lines.push(state.status.clone());
            lines.push(format!("(Re-poll in {}s)", state.ticks_left));
        }
        View::Main => {
            lines.push(format!(
                "[INFO] {}   (re-poll in {}s; q to quit, F5 to refresh)",
                state.status, state.ticks_left
            ));
            lines.push(String::new());
            for service in &state.services {
                lines.push(service.name.clone());
                for unit in &service.units {
                    let address =
                        unit.public_address.as_deref().unwrap_or("-");
                    lines.push(format!(
                        "  {} ({})  address: {address}",
                        unit.name, unit.agent_state
                    ));
                }
                for unit in service.errored_units() {
                    let info = unit
                        .agent_state_info
                        .as_deref()
                        .unwrap_or("no detail reported");
                    lines.push(format!("  !! {}: {info}", unit.name));
                }
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use gantry_common::{AgentState, Service, Unit};

    use super::*;

    fn unit(name: &str, state: AgentState, info: Option<&str>) -> Unit {
        Unit {
            name: name.to_string(),
            agent_state: state,
            public_address: Some("10.0.4.10".to_string()),
            agent_state_info: info.map(|i| i.to_string()),
        }
    }

    #[test]
    fn main_view_calls_out_errored_units() {
        let state = State {
            view: View::Main,
            status: "Deployment complete".to_string(),
            ticks_left: 7,
            services: vec![Service {
                name: "mysql".to_string(),
                units: vec![
                    unit("mysql/0", AgentState::Started, None),
                    unit(
                        "mysql/1",
                        AgentState::Error,
                        Some("hook failed: install"),
                    ),
                ],
            }],
            lock_entry: String::new(),
            lock_feedback: None,
        };

        let lines = render_lines(&state);
        assert!(lines.contains(&"mysql".to_string()));
        assert!(lines
            .contains(&"  !! mysql/1: hook failed: install".to_string()));
        // Healthy units get no call-out line.
        assert!(!lines.iter().any(|l| l.starts_with("  !! mysql/0")));
    }

    #[test]
    fn locked_view_shows_prompt_and_masked_entry() {
        let state = State {
            view: View::Locked,
            status: String::new(),
            ticks_left: 0,
            services: vec![],
            lock_entry: "***".to_string(),
            lock_feedback: Some("Invalid password.".to_string()),
        };

        let lines = render_lines(&state);
        assert!(lines.contains(&IdleLockGate::LOCKED_PROMPT.to_string()));
        assert!(lines.contains(&"Invalid password.".to_string()));
        assert!(lines.contains(&"Password: ***".to_string()));
    }
}
