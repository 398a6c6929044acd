//! Time sources and tick pacing for the scheduler loop.
//!
//! Pacing waits out the remainder of each tick measured from the previous
//! tick boundary. The spinning strategies never yield to the OS scheduler
//! inside their final window.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::PacingConfig;

/// Monotonic time elapsed since playback started.
pub trait PlaybackClock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Blocks the scheduler until one tick `period` has passed since the last
/// boundary, then starts the next one.
pub trait Pacer {
    fn wait_tick(&mut self, period: Duration);
}

/// Spins for the whole tick.
#[derive(Debug, Clone, Copy)]
pub struct SpinPacer {
    boundary: Instant,
}

impl SpinPacer {
    pub fn new() -> Self {
        Self {
            boundary: Instant::now(),
        }
    }
}

impl Default for SpinPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for SpinPacer {
    fn wait_tick(&mut self, period: Duration) {
        spin_until(self.boundary, period);
        self.boundary = Instant::now();
    }
}

/// Sleeps until `spin_window` before the deadline, then spins the rest.
#[derive(Debug, Clone, Copy)]
pub struct HybridPacer {
    boundary: Instant,
    spin_window: Duration,
}

impl HybridPacer {
    pub fn new(spin_window: Duration) -> Self {
        Self {
            boundary: Instant::now(),
            spin_window,
        }
    }
}

impl Pacer for HybridPacer {
    fn wait_tick(&mut self, period: Duration) {
        let remaining = period.saturating_sub(self.boundary.elapsed());
        if remaining > self.spin_window {
            thread::sleep(remaining - self.spin_window);
        }
        spin_until(self.boundary, period);
        self.boundary = Instant::now();
    }
}

fn spin_until(boundary: Instant, period: Duration) {
    while boundary.elapsed() < period {
        std::hint::spin_loop();
    }
}

/// Pacer selected by configuration.
#[derive(Debug, Clone, Copy)]
pub enum ConfiguredPacer {
    Spin(SpinPacer),
    Hybrid(HybridPacer),
}

impl From<PacingConfig> for ConfiguredPacer {
    fn from(config: PacingConfig) -> Self {
        match config {
            PacingConfig::Spin => Self::Spin(SpinPacer::new()),
            PacingConfig::Hybrid { spin_window_us } => {
                Self::Hybrid(HybridPacer::new(Duration::from_micros(spin_window_us)))
            }
        }
    }
}

impl Pacer for ConfiguredPacer {
    fn wait_tick(&mut self, period: Duration) {
        match self {
            Self::Spin(pacer) => pacer.wait_tick(period),
            Self::Hybrid(pacer) => pacer.wait_tick(period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::start();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn spin_pacer_waits_a_full_period() {
        let mut pacer = SpinPacer::new();
        let started = Instant::now();
        pacer.wait_tick(Duration::from_millis(2));
        assert!(started.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn spin_pacer_measures_from_previous_boundary() {
        let mut pacer = SpinPacer::new();
        pacer.wait_tick(Duration::from_millis(1));
        let boundary = Instant::now();
        pacer.wait_tick(Duration::from_millis(1));
        assert!(boundary.elapsed() >= Duration::from_micros(900));
    }

    #[test]
    fn hybrid_pacer_waits_a_full_period() {
        let mut pacer = HybridPacer::new(Duration::from_micros(500));
        let started = Instant::now();
        pacer.wait_tick(Duration::from_millis(3));
        assert!(started.elapsed() >= Duration::from_millis(3));
    }

    #[test]
    fn builds_pacer_from_config() {
        let pacer = ConfiguredPacer::from(PacingConfig::Hybrid {
            spin_window_us: 250,
        });
        assert!(matches!(pacer, ConfiguredPacer::Hybrid(_)));
    }
}
