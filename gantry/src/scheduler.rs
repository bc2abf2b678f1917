// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Countdown that decides when the next state poll fires.
///
/// Driven once per wall-clock tick by the runner. When the countdown
/// reaches zero it resets to the poll interval and reports that a poll
/// should fire; the visible countdown decrements on every call either
/// way. A fresh scheduler fires on its first tick.
#[derive(Debug)]
pub struct TickScheduler {
    poll_interval: u64,
    ticks_left: u64,
}

impl TickScheduler {
    pub fn new(poll_interval: u64) -> TickScheduler {
        // ticks_left starts at zero so the very first tick polls.
        TickScheduler { poll_interval: poll_interval.max(1), ticks_left: 0 }
    }

    /// Advance one tick. Returns true if a poll should fire now.
    pub fn tick(&mut self) -> bool {
        let fire = self.ticks_left == 0;
        if fire {
            self.ticks_left = self.poll_interval;
        }
        self.ticks_left -= 1;
        fire
    }

    /// Make the next tick poll immediately (the manual refresh key).
    pub fn refresh_now(&mut self) {
        self.ticks_left = 0;
    }

    /// Seconds until the next poll, for display.
    pub fn ticks_left(&self) -> u64 {
        self.ticks_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_polls_and_resets_countdown() {
        let mut scheduler = TickScheduler::new(10);
        assert!(scheduler.tick());
        assert_eq!(scheduler.ticks_left(), 9);
    }

    #[test]
    fn countdown_decrements_every_tick_until_next_poll() {
        let mut scheduler = TickScheduler::new(3);
        assert!(scheduler.tick()); // 2
        assert!(!scheduler.tick()); // 1
        assert!(!scheduler.tick()); // 0
        assert!(scheduler.tick()); // fired again, back to 2
        assert_eq!(scheduler.ticks_left(), 2);
    }

    #[test]
    fn refresh_now_forces_the_next_tick_to_poll() {
        let mut scheduler = TickScheduler::new(10);
        assert!(scheduler.tick());
        assert!(!scheduler.tick());
        scheduler.refresh_now();
        assert!(scheduler.tick());
        assert_eq!(scheduler.ticks_left(), 9);
    }

    #[test]
    fn zero_interval_is_clamped() {
        // A zero interval would underflow the countdown; clamp to
        // polling every tick.
        let mut scheduler = TickScheduler::new(0);
        assert!(scheduler.tick());
        assert!(scheduler.tick());
    }
}
