use std::sync::Arc;
use std::time::Duration;

use crate::actuator::{ActuatorBackend, RefreshTask};
use crate::clock::{ConfiguredPacer, MonotonicClock};
use crate::scheduler::{PlaybackContext, PlaybackReport, Scheduler};
use crate::{HapticError, PlayerConfig, Result, Score};

/// A validated score, configuration and actuator, ready to play.
///
/// Every startup failure surfaces from [`Session::open`] or
/// [`Session::with_score`]; once a session exists, [`Session::run`] only fails
/// if the refresh thread cannot be spawned.
pub struct Session {
    config: PlayerConfig,
    score: Score,
    backend: Arc<dyn ActuatorBackend>,
}

impl Session {
    /// Loads the score named by the configuration.
    pub fn open(config: PlayerConfig, backend: Arc<dyn ActuatorBackend>) -> Result<Self> {
        config.validate()?;
        let score = Score::load(config.input_path()?)?;
        Self::with_score(config, score, backend)
    }

    pub fn with_score(
        config: PlayerConfig,
        score: Score,
        backend: Arc<dyn ActuatorBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let channels = backend.channels();
        if channels.is_empty() && !config.debug {
            return Err(HapticError::NoChannels);
        }
        tracing::info!(summary = ?score.summary(), "score loaded");
        tracing::info!(count = channels.len(), "found haptic channels");
        for channel in &channels {
            tracing::info!(id = channel.id, path = %channel.path, "channel");
        }

        Ok(Self {
            config,
            score,
            backend,
        })
    }

    /// Plays the score to the end on the calling thread while a background
    /// task keeps the actuator refreshed.
    pub fn run(&self) -> Result<PlaybackReport> {
        let _refresh = RefreshTask::start(
            self.backend.clone(),
            Duration::from_millis(self.config.refresh_interval_ms),
        )?;

        let context = PlaybackContext::new(
            &self.score,
            self.backend.channels(),
            self.config.tolerance_ms,
        );
        let mut scheduler = Scheduler::new(
            context,
            self.backend.as_ref(),
            MonotonicClock::start(),
            ConfiguredPacer::from(self.config.pacing),
            self.config.volume,
        )?;
        Ok(scheduler.run())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("tracks", &self.score.tracks().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::testing::RecordingActuator;
    use crate::score::{Event, NoteEvent, TimedEvent, Track};

    fn short_score() -> Score {
        Score::new(
            480,
            vec![Track::new(vec![
                TimedEvent::new(0, Event::Note(NoteEvent::new(69, 480))),
                TimedEvent::new(12, Event::Note(NoteEvent::new(72, 480))),
                TimedEvent::new(24, Event::EndOfTrack),
            ])],
        )
        .unwrap()
    }

    #[test]
    fn plays_score_against_backend() {
        let backend = Arc::new(RecordingActuator::new(2));
        let session =
            Session::with_score(PlayerConfig::default(), short_score(), backend.clone()).unwrap();

        let report = session.run().unwrap();

        assert_eq!(report.notes_triggered, 2);
        assert_eq!(report.ticks, 24);
        let channels: Vec<_> = backend.pulses().iter().map(|(id, _)| *id).collect();
        assert_eq!(channels, vec![0, 1]);
        assert!(backend.refreshes.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    fn refuses_to_start_without_channels() {
        let backend = Arc::new(RecordingActuator::new(0));
        let err = Session::with_score(PlayerConfig::default(), short_score(), backend).unwrap_err();
        assert!(matches!(err, HapticError::NoChannels));
    }

    #[test]
    fn debug_mode_runs_without_channels() {
        let backend = Arc::new(RecordingActuator::new(0));
        let config = PlayerConfig {
            debug: true,
            ..Default::default()
        };
        let session = Session::with_score(config, short_score(), backend).unwrap();
        let report = session.run().unwrap();
        assert_eq!(report.notes_dropped_busy, 2);
    }

    #[test]
    fn missing_score_file_is_fatal() {
        let config = PlayerConfig {
            input: Some("does/not/exist.mid".into()),
            ..Default::default()
        };
        let backend = Arc::new(RecordingActuator::new(1));
        let err = Session::open(config, backend).unwrap_err();
        assert!(format!("{err}").contains("does not exist"));
    }

    #[test]
    fn invalid_config_is_fatal() {
        let config = PlayerConfig {
            volume: -0.5,
            ..Default::default()
        };
        let backend = Arc::new(RecordingActuator::new(1));
        assert!(Session::with_score(config, short_score(), backend).is_err());
    }
}
