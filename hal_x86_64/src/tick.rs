//! Sleep tick clock.
//!
//! A periodic interrupt (RTC or PIT) advances the clock from its handler;
//! everything else reads it. There is no blocking primitive, so `wait`
//! spin-checks elapsed ticks.

use std::sync::atomic::{AtomicU64, Ordering};

use hal::TimerDevice;

/// Monotonic tick counter shared between an ISR and waiters.
#[derive(Debug, Default)]
pub struct SleepClock {
    ticks: AtomicU64,
}

impl SleepClock {
    /// Creates a clock at tick zero.
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Advances the clock by one tick. Called from the interrupt handler.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of ticks since the clock was created.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Returns true once at least `count` ticks have elapsed since `start`.
    pub fn elapsed_since(&self, start: u64, count: u64) -> bool {
        self.ticks().saturating_sub(start) >= count
    }

    /// Spins until `count` ticks have elapsed.
    ///
    /// Never returns if nothing advances the clock.
    pub fn wait(&self, count: u64) {
        let start = self.ticks();
        while !self.elapsed_since(start, count) {
            std::hint::spin_loop();
        }
    }
}

impl TimerDevice for &SleepClock {
    fn poll_ticks(&mut self) -> u64 {
        self.ticks()
    }
}

/// Process-wide sleep clock advanced by the RTC interrupt.
pub fn sleep_clock() -> &'static SleepClock {
    static CLOCK: SleepClock = SleepClock::new();
    &CLOCK
}
