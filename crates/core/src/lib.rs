//! Core library for the Haptic Player.
//!
//! The crate turns a Standard MIDI File into haptic pulses on a small set of
//! vibration-capable output channels. Playback is driven by a single-threaded,
//! tick-accurate scheduler that honours tempo changes and keeps every channel
//! from being re-triggered while it is still busy. Channel discovery and the
//! physical pulse are delegated to an [`ActuatorBackend`].

pub mod actuator;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod tempo;
pub mod timeline;

pub use actuator::{ActuatorBackend, LineProtocolActuator, LogActuator, Pulse, RefreshTask};
pub use channel::{Channel, ChannelAllocator, ChannelDescriptor};
pub use clock::{ConfiguredPacer, HybridPacer, MonotonicClock, Pacer, PlaybackClock, SpinPacer};
pub use config::{PacingConfig, PlayerConfig};
pub use error::{HapticError, Result};
pub use scheduler::{
    pitch_to_frequency, PlaybackContext, PlaybackReport, Scheduler, SchedulerState,
};
pub use score::{Event, NoteEvent, Score, ScoreSummary, Tempo, TimedEvent, Track};
pub use session::Session;
pub use tempo::TempoClock;
pub use timeline::{DueEvents, PlaybackCursor, TrackCursor};
