// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge between blocking operations and the single-threaded loop.
//!
//! The runner never blocks: every slow operation (state polls, remote
//! provisioning calls) runs on a short-lived worker thread and its
//! result comes back as exactly one [`Event`] on the loop's channel.
//! The channel send is the only synchronization needed; the worker's
//! write of the result happens-before the loop observes the event.

use std::sync::mpsc::Sender;
use std::thread;

use slog::{o, warn, Logger};

use crate::events::Event;

/// Runs blocking closures off the loop thread and marshals their
/// results back in as events.
#[derive(Debug, Clone)]
pub struct AsyncBridge {
    log: Logger,
    events_tx: Sender<Event>,
}

impl AsyncBridge {
    pub fn new(log: &Logger, events_tx: Sender<Event>) -> AsyncBridge {
        let log = log.new(o!("component" => "AsyncBridge"));
        AsyncBridge { log, events_tx }
    }

    /// Run `op` on a worker thread and deliver `wrap(result)` to the
    /// loop exactly once.
    ///
    /// A failed `op` is logged here and the callback still fires, with
    /// `T::default()` in place of a result; the loop never observes an
    /// error value. The worker always runs to completion; there is no
    /// cancellation path.
    ///
    /// Callers must not launch overlapping calls of the same logical
    /// operation; the bridge does not deduplicate.
    pub fn run<T, F, W>(&self, name: &'static str, op: F, wrap: W)
    where
        T: Default + Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        W: FnOnce(T) -> Event + Send + 'static,
    {
        let log = self.log.clone();
        let events_tx = self.events_tx.clone();
        thread::spawn(move || {
            let value = match op() {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        log, "bridged call failed";
                        "op" => name,
                        "error" => #%error
                    );
                    T::default()
                }
            };
            // A send error means the loop is gone and the program is
            // exiting; there is nobody left to notify.
            let _ = events_tx.send(wrap(value));
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, RecvTimeoutError};
    use std::time::Duration;

    use anyhow::anyhow;
    use gantry_common::PollResult;

    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[test]
    fn delivers_successful_result() {
        let (tx, rx) = channel();
        let bridge = AsyncBridge::new(&test_logger(), tx);

        bridge.run(
            "poll-state",
            || Ok(PollResult::default()),
            Event::Snapshot
        );

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, Event::Snapshot(PollResult::default()));
    }

    #[test]
    fn failure_still_fires_callback_exactly_once_with_default() {
        let (tx, rx) = channel();
        let bridge = AsyncBridge::new(&test_logger(), tx);

        bridge.run(
            "poll-state",
            || Err(anyhow!("remote API unreachable")),
            Event::Snapshot
        );

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, Event::Snapshot(PollResult::default()));

        // Exactly once: nothing else arrives and the worker's sender
        // clone has been dropped.
        match rx.recv_timeout(Duration::from_millis(100)) {
            Err(RecvTimeoutError::Timeout)
            | Err(RecvTimeoutError::Disconnected) => {}
            Ok(event) => panic!("unexpected second event: {event:?}"),
        }
    }

    #[test]
    fn results_do_not_interleave_with_loop_work() {
        // The loop drains events one at a time, so a callback can
        // never re-enter the loop mid-callback: both completions are
        // observed as distinct events.
        let (tx, rx) = channel();
        let bridge = AsyncBridge::new(&test_logger(), tx);

        bridge.run("add-machine", || Ok(None), Event::MachineAdded);
        bridge.run(
            "poll-state",
            || Ok(PollResult::default()),
            Event::Snapshot
        );

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert!(seen.contains(&Event::MachineAdded(None)));
        assert!(seen.contains(&Event::Snapshot(PollResult::default())));
    }
}
