// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The single-threaded event loop.
//!
//! The runner owns all mutable state: the orchestrator's progress, the
//! poll scheduler, the idle lock, and the view model handed to the
//! screen. Everything from the outside world arrives as an [`Event`]
//! over one channel; slow work leaves through the [`AsyncBridge`] and
//! comes back the same way. No state is ever touched off this thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::Event as TermEvent;
use crossterm::event::EventStream;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use gantry_common::{MachineConstraints, PollResult, Service};
use slog::{debug, error, info, o, Logger};
use tokio::time::interval;

use crate::bridge::AsyncBridge;
use crate::charms::registry_from_config;
use crate::client::{CliControlPlane, ControlPlaneClient};
use crate::config::{Config, Mode};
use crate::events::{Action, Event, View};
use crate::keymap::{is_control_c, Cmd, KeyHandler};
use crate::lock::{FilePasswordStore, IdleLockGate, PasswordStore};
use crate::net::{NetworkConfigurer, SshNetworkConfigurer};
use crate::orchestrator::{DeploymentOrchestrator, MachineProvisioner};
use crate::poller::{CliSnapshotProvider, SnapshotProvider};
use crate::screen::Screen;
use crate::scheduler::TickScheduler;
use crate::TICK_INTERVAL;

/// Constraints for the machine requested at startup in single-node
/// mode, matching what the bundle needs to fit on one host.
const BOOTSTRAP_CONSTRAINTS: [(&str, &str); 3] =
    [("mem", "3G"), ("root-disk", "20G"), ("cpu-cores", "3")];

/// Production [`MachineProvisioner`]: dispatches `add-machine`
/// through the bridge so the loop thread never blocks on it.
struct BridgedProvisioner {
    bridge: AsyncBridge,
    client: Arc<dyn ControlPlaneClient>,
    in_flight: Arc<AtomicBool>,
}

impl MachineProvisioner for BridgedProvisioner {
    fn request_add_machine(&self) {
        // The orchestrator asks again on every tick while it waits;
        // keep a single outstanding provisioning call.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = self.client.clone();
        let in_flight = self.in_flight.clone();
        self.bridge.run(
            "add-machine",
            move || {
                let result = client.add_machine(None).map(Some);
                in_flight.store(false, Ordering::SeqCst);
                result
            },
            Event::MachineAdded
        );
    }
}

/// The view model handed to the screen after every event.
#[derive(Debug, Clone)]
pub struct State {
    pub view: View,
    pub status: String,
    pub ticks_left: u64,
    pub services: Vec<Service>,
    pub lock_entry: String,
    pub lock_feedback: Option<String>,
}

pub struct Runner {
    log: Logger,
    screen: Box<dyn Screen>,
    events_rx: Receiver<Event>,
    events_tx: Sender<Event>,
    state: State,
    orchestrator: DeploymentOrchestrator,
    scheduler: TickScheduler,
    lock: IdleLockGate,
    bridge: AsyncBridge,
    provider: Arc<dyn SnapshotProvider>,
    client: Arc<dyn ControlPlaneClient>,
    mode: Mode,
    poll_in_flight: bool,
    bootstrap_checked: bool,
    tokio_rt: tokio::runtime::Runtime,
}

impl Runner {
    pub fn new(
        log: &Logger,
        config: &Config,
        screen: Box<dyn Screen>,
    ) -> Result<Runner> {
        let client: Arc<dyn ControlPlaneClient> = Arc::new(
            CliControlPlane::new(log, &config.control_plane.command)
        );
        let provider: Arc<dyn SnapshotProvider> =
            Arc::new(CliSnapshotProvider::new(
                log,
                &config.control_plane.command,
                config.infrastructure.as_ref().map(|i| i.command.clone()),
            ));
        let net = Box::new(SshNetworkConfigurer::new(
            log,
            config.network_template.clone(),
            config.remote_user.clone(),
        ));
        let store =
            Box::new(FilePasswordStore::new(config.password_file.clone()));
        Runner::with_deps(log, config, screen, client, provider, net, store)
    }

    /// Construct from externally supplied seams; tests use this so the
    /// loop never spawns a process or opens a connection.
    fn with_deps(
        log: &Logger,
        config: &Config,
        screen: Box<dyn Screen>,
        client: Arc<dyn ControlPlaneClient>,
        provider: Arc<dyn SnapshotProvider>,
        net: Box<dyn NetworkConfigurer>,
        store: Box<dyn PasswordStore>,
    ) -> Result<Runner> {
        let log = log.new(o!("component" => "Runner"));
        let (events_tx, events_rx) = channel();
        let bridge = AsyncBridge::new(&log, events_tx.clone());

        let provisioner = BridgedProvisioner {
            bridge: bridge.clone(),
            client: client.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
        };
        let orchestrator = DeploymentOrchestrator::new(
            &log,
            config.mode,
            registry_from_config(&log, config),
            Box::new(provisioner),
            net
        );

        let lock = IdleLockGate::new(&log, config.lock_timeout, store);

        let state = State {
            view: View::Installer,
            status: orchestrator.status().to_string(),
            ticks_left: 0,
            services: Vec::new(),
            lock_entry: String::new(),
            lock_feedback: None,
        };

        let tokio_rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Runner {
            log,
            screen,
            events_rx,
            events_tx,
            state,
            orchestrator,
            scheduler: TickScheduler::new(config.poll_interval),
            lock,
            bridge,
            provider,
            client,
            mode: config.mode,
            poll_in_flight: false,
            bootstrap_checked: false,
            tokio_rt,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_event_listener();
        enable_raw_mode()?;
        let result = self.mainloop();
        disable_raw_mode()?;
        result
    }

    fn mainloop(&mut self) -> Result<()> {
        info!(self.log, "starting main loop");
        self.screen.draw(&self.state)?;

        loop {
            // The loop owns a Sender clone, so the channel can only
            // disconnect when the program is already tearing down.
            let Ok(event) = self.events_rx.recv() else {
                break;
            };
            match self.handle_event(event) {
                Some(Action::Quit) => {
                    info!(self.log, "exiting");
                    break;
                }
                Some(Action::Redraw) => {
                    self.screen.draw(&self.state)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Interpret one event. Factored out of the loop so it can be
    /// driven directly in tests.
    fn handle_event(&mut self, event: Event) -> Option<Action> {
        match event {
            Event::Tick => {
                self.lock.tick(&mut self.state.view);
                if self.scheduler.tick() {
                    self.spawn_poll();
                }
                self.state.ticks_left = self.scheduler.ticks_left();
                self.sync_lock_display();
                Some(Action::Redraw)
            }
            Event::Term(cmd) => {
                self.lock.on_input();
                if self.lock.is_locked() {
                    let done = self.orchestrator.is_done();
                    self.lock.handle_cmd(cmd, &mut self.state.view, done);
                    self.sync_lock_display();
                    Some(Action::Redraw)
                } else {
                    self.handle_unlocked_cmd(cmd)
                }
            }
            Event::Snapshot(poll) => {
                self.poll_in_flight = false;
                self.maybe_bootstrap_machine(&poll);

                let continuing = self.orchestrator.process(&poll);
                if !continuing && self.state.view == View::Installer {
                    // The bundle is live; retire the install overlay.
                    self.state.view = View::Main;
                }

                self.state.status = self.orchestrator.status().to_string();
                self.state.services = poll.snapshot.services().to_vec();
                Some(Action::Redraw)
            }
            Event::MachineAdded(result) => {
                match result {
                    Some(machine) => {
                        debug!(
                            self.log, "machine added";
                            "machine_id" => machine.id
                        );
                    }
                    // The failure was already logged by the bridge;
                    // the next poll decides what happens.
                    None => {}
                }
                None
            }
            Event::Resize { .. } => Some(Action::Redraw),
            Event::Shutdown => Some(Action::Quit),
        }
    }

    fn handle_unlocked_cmd(&mut self, cmd: Cmd) -> Option<Action> {
        match cmd {
            Cmd::Char('q') | Cmd::Char('Q') => Some(Action::Quit),
            Cmd::Refresh | Cmd::Char('r') => {
                self.scheduler.refresh_now();
                Some(Action::Redraw)
            }
            _ => None,
        }
    }

    /// Launch a bridged state poll, keeping at most one outstanding.
    fn spawn_poll(&mut self) {
        if self.poll_in_flight {
            return;
        }
        self.poll_in_flight = true;
        let provider = self.provider.clone();
        self.bridge.run("poll-state", move || provider.poll(), Event::Snapshot);
    }

    /// On the first poll of a single-node install, request the host
    /// machine if the control plane has none yet.
    fn maybe_bootstrap_machine(&mut self, poll: &PollResult) {
        if self.mode != Mode::Single || self.bootstrap_checked {
            return;
        }
        // A failed poll delivers the default result. That is not
        // evidence the cluster is empty, so the decision waits for a
        // poll that actually completed.
        if !poll.fresh {
            return;
        }
        self.bootstrap_checked = true;
        if !poll.snapshot.machines_allocated().is_empty() {
            return;
        }

        info!(self.log, "requesting initial machine");
        let client = self.client.clone();
        self.bridge.run(
            "bootstrap-machine",
            move || {
                let constraints =
                    MachineConstraints::from(BOOTSTRAP_CONSTRAINTS);
                client.add_machine(Some(&constraints)).map(Some)
            },
            Event::MachineAdded
        );
    }

    fn sync_lock_display(&mut self) {
        self.state.lock_entry = self.lock.masked_entry();
        self.state.lock_feedback =
            self.lock.feedback().map(|f| f.to_string());
    }

    /// Forward terminal input and a 1s heartbeat into the loop.
    fn start_event_listener(&self) {
        let events_tx = self.events_tx.clone();
        let log = self.log.clone();
        self.tokio_rt.spawn(async move {
            let mut events = EventStream::new();
            let mut ticker = interval(TICK_INTERVAL);
            let mut key_handler = KeyHandler::default();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if events_tx.send(Event::Tick).is_err() {
                            // The receiver was dropped; we're exiting.
                            return;
                        }
                    }
                    event = events.next() => {
                        let event = match event {
                            None => {
                                error!(log, "event stream completed");
                                return;
                            }
                            Some(Err(e)) => {
                                error!(
                                    log, "failed to receive event";
                                    "error" => %e
                                );
                                return;
                            }
                            Some(Ok(event)) => event,
                        };
                        let event = match event {
                            TermEvent::Key(key) if is_control_c(&key) => {
                                Event::Shutdown
                            }
                            TermEvent::Key(key) => {
                                match key_handler.on(key) {
                                    Some(cmd) => Event::Term(cmd),
                                    None => continue,
                                }
                            }
                            TermEvent::Resize(width, height) => {
                                Event::Resize { width, height }
                            }
                            _ => continue,
                        };
                        if events_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use gantry_common::{AgentState, Machine, MachineRef, Snapshot, Unit};

    use super::*;
    use crate::config::{CharmDef, ControlPlaneConfig};

    struct CountingScreen {
        draws: Arc<AtomicUsize>,
    }

    impl Screen for CountingScreen {
        fn draw(&mut self, _state: &State) -> Result<()> {
            self.draws.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubClient;

    impl ControlPlaneClient for StubClient {
        fn add_machine(
            &self,
            _constraints: Option<&MachineConstraints>,
        ) -> Result<MachineRef> {
            Ok(MachineRef::default())
        }
        fn add_unit(
            &self,
            _service_name: &str,
            _machine_id: Option<&str>,
            _count: u32,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct StubProvider;

    impl SnapshotProvider for StubProvider {
        fn poll(&self) -> Result<PollResult> {
            Ok(PollResult::default())
        }
    }

    struct RecordingNet {
        configured: Arc<AtomicUsize>,
    }

    impl NetworkConfigurer for RecordingNet {
        fn configure_host_bridge(&self, _machine: &Machine) -> Result<()> {
            self.configured.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoPassword;

    impl PasswordStore for NoPassword {
        fn verify(&self, _entered: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn test_config() -> Config {
        Config {
            mode: Mode::Single,
            poll_interval: 10,
            lock_timeout: 120,
            password_file: "/nonexistent/lock.passwd".into(),
            network_template: "/nonexistent/template".into(),
            remote_user: "ubuntu".to_string(),
            control_plane: ControlPlaneConfig {
                command: "/nonexistent/cpctl".to_string(),
            },
            infrastructure: None,
            charms: vec![CharmDef {
                name: "mysql".to_string(),
                deploy_priority: 10,
                allow_multi_units: false,
                setup: vec!["deploy".to_string(), "mysql".to_string()],
                relations: vec![],
                post_proc: None,
            }],
        }
    }

    fn test_runner() -> (Runner, Arc<AtomicUsize>) {
        let (runner, draws, _) = test_runner_parts();
        (runner, draws)
    }

    fn test_runner_parts() -> (Runner, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let draws = Arc::new(AtomicUsize::new(0));
        let net_configured = Arc::new(AtomicUsize::new(0));
        let runner = Runner::with_deps(
            &test_logger(),
            &test_config(),
            Box::new(CountingScreen { draws: draws.clone() }),
            Arc::new(StubClient),
            Arc::new(StubProvider),
            Box::new(RecordingNet { configured: net_configured.clone() }),
            Box::new(NoPassword),
        )
        .unwrap();
        (runner, draws, net_configured)
    }

    fn live_poll() -> PollResult {
        let mut machine = Machine::new("0", AgentState::Started);
        machine.dns_name = Some("10.0.4.2".to_string());
        PollResult::new(
            Snapshot::new(
                vec![machine],
                vec![Service {
                    name: "mysql".to_string(),
                    units: vec![Unit {
                        name: "mysql/0".to_string(),
                        agent_state: AgentState::Started,
                        public_address: Some("10.0.4.10".to_string()),
                        agent_state_info: None,
                    }],
                }],
            ),
            Default::default(),
        )
    }

    #[test]
    fn q_quits_when_unlocked() {
        let (mut runner, _) = test_runner();
        runner.lock.on_input(); // not locked
        assert_eq!(
            runner.handle_event(Event::Term(Cmd::Char('q'))),
            Some(Action::Quit)
        );
    }

    #[test]
    fn q_feeds_password_entry_when_locked() {
        let (mut runner, _) = test_runner();
        // Gate starts at zero: the first tick locks.
        runner.handle_event(Event::Tick);
        assert_eq!(runner.state.view, View::Locked);

        let action = runner.handle_event(Event::Term(Cmd::Char('q')));
        assert_eq!(action, Some(Action::Redraw));
        assert_eq!(runner.state.lock_entry, "*");
    }

    #[test]
    fn completed_install_retires_the_installer_view() {
        let (mut runner, _) = test_runner();
        runner.bootstrap_checked = true;
        assert_eq!(runner.state.view, View::Installer);

        // The service already exists in the snapshot, so no hooks run
        // and the orchestrator completes on the first pass.
        let action = runner.handle_event(Event::Snapshot(live_poll()));
        assert_eq!(action, Some(Action::Redraw));
        assert_eq!(runner.state.view, View::Main);
        assert!(runner.orchestrator.is_done());
        assert_eq!(runner.state.services.len(), 1);
    }

    #[test]
    fn failed_first_poll_does_not_bootstrap() {
        let (mut runner, _) = test_runner();

        // A failed poll arrives as the default result; that says
        // nothing about the cluster, so no machine may be requested
        // and the decision must stay open.
        runner.handle_event(Event::Snapshot(PollResult::default()));
        assert!(!runner.bootstrap_checked);

        // The next poll completes and really is empty: now bootstrap.
        runner.handle_event(Event::Snapshot(PollResult::new(
            Snapshot::default(),
            Default::default(),
        )));
        assert!(runner.bootstrap_checked);
    }

    #[test]
    fn network_rewrite_goes_through_the_injected_seam() {
        let (mut runner, _draws, net_configured) = test_runner_parts();
        runner.bootstrap_checked = true;

        runner.handle_event(Event::Snapshot(live_poll()));
        assert!(runner.orchestrator.is_done());
        assert_eq!(net_configured.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refresh_zeroes_the_poll_countdown() {
        let (mut runner, _) = test_runner();
        runner.lock.on_input();
        runner.poll_in_flight = true; // keep the test from polling

        runner.handle_event(Event::Tick); // first tick fires the poll
        assert_eq!(runner.state.ticks_left, 9);

        runner.handle_event(Event::Term(Cmd::Refresh));
        runner.handle_event(Event::Tick);
        assert_eq!(runner.state.ticks_left, 9, "countdown was reset");
    }

    #[test]
    fn shutdown_event_quits_even_while_locked() {
        let (mut runner, _) = test_runner();
        runner.handle_event(Event::Tick);
        assert_eq!(runner.state.view, View::Locked);
        assert_eq!(
            runner.handle_event(Event::Shutdown),
            Some(Action::Quit)
        );
    }
}
