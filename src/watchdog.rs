use std::cell::Cell;

use thiserror::Error;

/// Fixed diagnostic for a guest that kept running past its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("script ran {budget} instruction batches without yielding and was stopped by the watchdog")]
pub struct WatchdogExpired {
    pub budget: u32,
}

/// Countdown armed before each resume and decremented once per instruction batch.
#[derive(Debug)]
pub struct Watchdog {
    budget: u32,
    interval: u32,
    remaining: Cell<u32>,
    /// Instructions charged by hand since the last batch boundary.
    charged: Cell<u32>,
    tripped: Cell<bool>,
}

impl Watchdog {
    pub fn new(budget: u32, interval: u32) -> Self {
        let budget = budget.max(1);
        Self {
            budget,
            interval: interval.max(1),
            remaining: Cell::new(budget),
            charged: Cell::new(0),
            tripped: Cell::new(false),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Guest instructions per batch.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Refills the countdown for a fresh resume or top-level callback.
    pub fn arm(&self) {
        self.remaining.set(self.budget);
        self.charged.set(0);
        self.tripped.set(false);
    }

    /// Called by the interpreter hook once per instruction batch.
    pub fn tick(&self) -> Result<(), WatchdogExpired> {
        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);
        if remaining == 0 {
            self.tripped.set(true);
            return Err(self.expired());
        }
        Ok(())
    }

    /// Bills work the instruction hook cannot see. Moving the hook to another thread restarts its
    /// count, so every move is charged here instead.
    pub fn charge(&self, instructions: u32) -> Result<(), WatchdogExpired> {
        if self.tripped.get() {
            return Err(self.expired());
        }
        let mut charged = self.charged.get().saturating_add(instructions);
        while charged >= self.interval {
            charged -= self.interval;
            if let Err(expired) = self.tick() {
                self.charged.set(charged);
                return Err(expired);
            }
        }
        self.charged.set(charged);
        Ok(())
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.get()
    }

    /// Stays set until the next [`Watchdog::arm`], even if the guest swallowed the error.
    pub fn tripped(&self) -> bool {
        self.tripped.get()
    }

    pub fn expired(&self) -> WatchdogExpired {
        WatchdogExpired { budget: self.budget }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_exactly_at_budget() {
        let watchdog = Watchdog::new(3, 100);
        watchdog.arm();
        assert!(watchdog.tick().is_ok());
        assert!(watchdog.tick().is_ok());
        assert_eq!(watchdog.tick(), Err(WatchdogExpired { budget: 3 }));
        assert!(watchdog.tripped());
        assert!(watchdog.tick().is_err(), "stays expired until re-armed");
    }

    #[test]
    fn arm_resets_the_countdown() {
        let watchdog = Watchdog::new(2, 100);
        watchdog.arm();
        let _ = watchdog.tick();
        let _ = watchdog.tick();
        assert!(watchdog.tripped());
        watchdog.arm();
        assert!(!watchdog.tripped());
        assert_eq!(watchdog.remaining(), 2);
    }

    #[test]
    fn zero_budget_and_interval_are_clamped() {
        let watchdog = Watchdog::new(0, 0);
        assert_eq!((watchdog.budget(), watchdog.interval()), (1, 1));
        watchdog.arm();
        assert!(watchdog.tick().is_err());
    }

    #[test]
    fn charges_add_up_to_whole_batches() {
        let watchdog = Watchdog::new(3, 100);
        watchdog.arm();
        for _ in 0..6 {
            watchdog.charge(30).expect("under one batch per pair of charges");
        }
        assert_eq!(watchdog.remaining(), 2, "180 charged instructions make one batch");
        assert!(watchdog.charge(250).is_err());
        assert!(watchdog.tripped());
        assert!(watchdog.charge(1).is_err(), "stays expired until re-armed");
        watchdog.arm();
        assert_eq!(watchdog.remaining(), 3);
        assert!(watchdog.charge(99).is_ok());
        assert_eq!(watchdog.remaining(), 3);
    }
}
