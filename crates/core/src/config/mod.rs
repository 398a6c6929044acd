use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{HapticError, Result};

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Standard MIDI File to play. Required before playback starts.
    pub input: Option<PathBuf>,
    /// Haptic intensity in `[0, 1]` applied to every pulse.
    pub volume: f32,
    /// Milliseconds before the end of a busy window during which a channel
    /// may already be handed a new note.
    pub tolerance_ms: f64,
    /// Substitutes logged virtual channels for the physical actuator.
    pub debug: bool,
    /// Number of virtual channels exposed in debug mode.
    pub debug_channels: usize,
    /// Period of the background actuator refresh.
    pub refresh_interval_ms: u64,
    pub pacing: PacingConfig,
    /// Output channel paths announced to the line protocol backend.
    pub channels: Vec<String>,
    /// File receiving the pulse stream; standard output when unset.
    pub output: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            input: None,
            volume: 0.25,
            tolerance_ms: 40.0,
            debug: false,
            debug_channels: 2,
            refresh_interval_ms: 500,
            pacing: PacingConfig::default(),
            channels: Vec::new(),
            output: None,
        }
    }
}

impl PlayerConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Rejects option combinations that would make playback meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(HapticError::InvalidInput("volume must lie within [0, 1]"));
        }
        if !self.tolerance_ms.is_finite() || self.tolerance_ms < 0.0 {
            return Err(HapticError::InvalidInput(
                "tolerance must be a non-negative number of milliseconds",
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(HapticError::InvalidInput(
                "refresh interval must be at least one millisecond",
            ));
        }
        if let PacingConfig::Hybrid { spin_window_us } = self.pacing {
            if spin_window_us == 0 {
                return Err(HapticError::InvalidInput(
                    "hybrid pacing needs a non-zero spin window",
                ));
            }
        }
        Ok(())
    }

    /// Returns the score path or the startup error for a missing one.
    pub fn input_path(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .ok_or(HapticError::InvalidInput("input score path is not set"))
    }
}

/// How the scheduler waits out the remainder of each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PacingConfig {
    /// Spin on the monotonic clock for the whole tick.
    Spin,
    /// Sleep coarsely, then spin for the final `spin_window_us`.
    Hybrid { spin_window_us: u64 },
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::Spin
    }
}
