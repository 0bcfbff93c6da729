//! Power management
//!
//! External USB power banks switch off when the load drops too low. While the
//! device is in use a short pulse on the keep-alive output every few seconds
//! keeps the bank awake; once idle the output stays low so the bank can
//! sleep. An optional idle timeout powers the device off entirely.

use crate::config::TimingConfig;

/// Power-related outputs
pub trait PowerControl {
    /// Drive the keep-alive output
    fn set_keepalive(&mut self, high: bool);

    /// Cut power; the loop stops after this
    fn power_off(&mut self);
}

/// Keep-alive pulse generator
#[derive(Debug, Clone)]
pub struct KeepAlive {
    idle_timeout_ms: u64,
    interval_ms: u64,
    pulse_ms: u64,
    last_activity_ms: u64,
    last_pulse_ms: Option<u64>,
    pulse_started_ms: Option<u64>,
}

impl KeepAlive {
    #[must_use]
    pub const fn new(timing: &TimingConfig) -> Self {
        Self {
            idle_timeout_ms: timing.keepalive_idle_timeout_ms,
            interval_ms: timing.keepalive_pulse_interval_ms,
            pulse_ms: timing.keepalive_pulse_ms,
            last_activity_ms: 0,
            last_pulse_ms: None,
            pulse_started_ms: None,
        }
    }

    /// Record user or network activity
    pub const fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Time since the last activity
    #[must_use]
    pub const fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms)
    }

    /// Whether a pulse is being held right now
    #[must_use]
    pub const fn is_pulsing(&self) -> bool {
        self.pulse_started_ms.is_some()
    }

    /// Advance the pulse timers and drive the output on changes
    pub fn tick(&mut self, now_ms: u64, power: &mut dyn PowerControl) {
        if self.idle_ms(now_ms) > self.idle_timeout_ms {
            if self.pulse_started_ms.take().is_some() {
                power.set_keepalive(false);
                tracing::debug!("idle, keep-alive pulses stopped");
            }
            return;
        }

        if let Some(started) = self.pulse_started_ms {
            if now_ms.saturating_sub(started) >= self.pulse_ms {
                power.set_keepalive(false);
                self.pulse_started_ms = None;
            }
            return;
        }

        let due = self
            .last_pulse_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms);
        if due {
            power.set_keepalive(true);
            self.pulse_started_ms = Some(now_ms);
            self.last_pulse_ms = Some(now_ms);
        }
    }
}

/// Host stand-in: logs the keep-alive line, powering off ends the process loop
#[derive(Debug, Default)]
pub struct HostPower {
    powered_off: bool,
}

impl HostPower {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_powered_off(&self) -> bool {
        self.powered_off
    }
}

impl PowerControl for HostPower {
    fn set_keepalive(&mut self, high: bool) {
        tracing::trace!(high, "keep-alive output");
    }

    fn power_off(&mut self) {
        tracing::info!("power off");
        self.powered_off = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Pin {
        writes: Vec<(u64, bool)>,
        now: u64,
    }

    impl PowerControl for Pin {
        fn set_keepalive(&mut self, high: bool) {
            self.writes.push((self.now, high));
        }

        fn power_off(&mut self) {}
    }

    fn run(keep: &mut KeepAlive, pin: &mut Pin, until: u64) {
        while pin.now <= until {
            keep.tick(pin.now, pin);
            pin.now += 10;
        }
    }

    #[test]
    fn pulses_while_active() {
        let mut keep = KeepAlive::new(&TimingConfig::default());
        let mut pin = Pin::default();
        run(&mut keep, &mut pin, 30_050);

        assert_eq!(
            pin.writes,
            vec![
                (0, true),
                (100, false),
                (15_000, true),
                (15_100, false),
                (30_000, true),
            ]
        );
        assert!(keep.is_pulsing());
    }

    #[test]
    fn goes_quiet_when_idle() {
        let timing = TimingConfig {
            keepalive_idle_timeout_ms: 1000,
            keepalive_pulse_interval_ms: 500,
            ..TimingConfig::default()
        };
        let mut keep = KeepAlive::new(&timing);
        let mut pin = Pin::default();
        run(&mut keep, &mut pin, 5000);

        let last_high = pin.writes.iter().rev().find(|(_, high)| *high).unwrap().0;
        assert!(last_high <= 1000);
        assert_eq!(pin.writes.last().map(|w| w.1), Some(false));

        // Activity resumes pulsing
        keep.touch(pin.now);
        keep.tick(pin.now, &mut pin);
        assert!(keep.is_pulsing());
    }
}
