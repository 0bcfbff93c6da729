//! Monotonic time source for the tick loop

use std::time::{Duration, Instant};

/// Millisecond clock with a blocking delay
///
/// Every timer in the loop reads time through this trait so tests can run
/// whole sessions against a simulated clock.
pub trait Clock {
    /// Milliseconds since the clock was created
    fn now_ms(&self) -> u64;

    /// Block the loop for `ms` milliseconds
    fn delay_ms(&self, ms: u64);
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        clock.delay_ms(2);
        assert!(clock.now_ms() >= a + 2);
    }
}
