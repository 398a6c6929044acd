use std::time::Duration;

use crate::{HapticError, Result};

/// Tempo assumed until the score announces one.
pub const DEFAULT_BPM: f64 = 120.0;

/// Resolution of the monotonic clock the scheduler paces against.
pub const CLOCK_FREQUENCY_HZ: f64 = 1_000_000_000.0;

/// Converts ticks into wall-clock time for the most recently applied tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoClock {
    ticks_per_quarter: u16,
    clock_frequency_hz: f64,
    bpm: f64,
    ms_per_tick: f64,
    clock_ticks_per_tick: f64,
    tick_period: Duration,
}

/// Quantities derived from one tempo, checked before they replace the
/// current ones.
struct TickTiming {
    ms_per_tick: f64,
    clock_ticks_per_tick: f64,
    tick_period: Duration,
}

impl TickTiming {
    fn derive(bpm: f64, ticks_per_quarter: u16, clock_frequency_hz: f64) -> Result<Self> {
        let ticks_per_minute = bpm * f64::from(ticks_per_quarter);
        let ms_per_tick = 60_000.0 / ticks_per_minute;
        let clock_ticks_per_tick = (60.0 * clock_frequency_hz) / ticks_per_minute;
        if !(ms_per_tick.is_finite() && ms_per_tick > 0.0 && clock_ticks_per_tick.is_finite()) {
            return Err(HapticError::InvalidInput(
                "tempo gives a tick length outside the representable range",
            ));
        }
        let tick_period = Duration::try_from_secs_f64(clock_ticks_per_tick / clock_frequency_hz)
            .map_err(|_| {
                HapticError::InvalidInput("tempo gives a tick period that cannot be waited for")
            })?;
        Ok(Self {
            ms_per_tick,
            clock_ticks_per_tick,
            tick_period,
        })
    }
}

impl TempoClock {
    /// Creates a clock at [`DEFAULT_BPM`] paced in nanoseconds.
    pub fn new(ticks_per_quarter: u16) -> Self {
        let ticks_per_quarter = ticks_per_quarter.max(1);
        let ticks_per_minute = DEFAULT_BPM * f64::from(ticks_per_quarter);
        let clock_ticks_per_tick = (60.0 * CLOCK_FREQUENCY_HZ) / ticks_per_minute;
        Self {
            ticks_per_quarter,
            clock_frequency_hz: CLOCK_FREQUENCY_HZ,
            bpm: DEFAULT_BPM,
            ms_per_tick: 60_000.0 / ticks_per_minute,
            clock_ticks_per_tick,
            // Clock ticks are nanoseconds at the default frequency.
            tick_period: Duration::from_nanos(clock_ticks_per_tick.round() as u64),
        }
    }

    /// Creates a clock at [`DEFAULT_BPM`] whose clock ticks run at
    /// `clock_frequency_hz`, which must be positive and finite.
    pub fn with_clock_frequency(ticks_per_quarter: u16, clock_frequency_hz: f64) -> Result<Self> {
        if !clock_frequency_hz.is_finite() || clock_frequency_hz <= 0.0 {
            return Err(HapticError::InvalidInput(
                "clock frequency must be positive and finite",
            ));
        }
        let ticks_per_quarter = ticks_per_quarter.max(1);
        let timing = TickTiming::derive(DEFAULT_BPM, ticks_per_quarter, clock_frequency_hz)?;
        Ok(Self {
            ticks_per_quarter,
            clock_frequency_hz,
            bpm: DEFAULT_BPM,
            ms_per_tick: timing.ms_per_tick,
            clock_ticks_per_tick: timing.clock_ticks_per_tick,
            tick_period: timing.tick_period,
        })
    }

    /// Switches to `bpm` from this tick on. Both derived quantities are
    /// recomputed from scratch so repeated application is idempotent. On
    /// error the previous tempo stays in force.
    pub fn apply_tempo_change(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(HapticError::InvalidInput(
                "tempo must be a positive, finite bpm",
            ));
        }
        let timing = TickTiming::derive(bpm, self.ticks_per_quarter, self.clock_frequency_hz)?;
        self.bpm = bpm;
        self.ms_per_tick = timing.ms_per_tick;
        self.clock_ticks_per_tick = timing.clock_ticks_per_tick;
        self.tick_period = timing.tick_period;
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn ms_per_tick(&self) -> f64 {
        self.ms_per_tick
    }

    pub fn clock_ticks_per_tick(&self) -> f64 {
        self.clock_ticks_per_tick
    }

    /// Real-world length of `ticks` at the current tempo.
    pub fn ticks_to_ms(&self, ticks: u64) -> f64 {
        ticks as f64 * self.ms_per_tick
    }

    /// Wall-clock length of one tick, as waited for by the pacer.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }
}
