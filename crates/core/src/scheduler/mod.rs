//! The real-time playback loop.
//!
//! Each iteration polls every track cursor for events that are due at the
//! current tick, dispatches them, then advances the tick and paces against the
//! monotonic clock. The loop is the only writer of the tick counter, the
//! cursors and the channel busy windows.

use crate::actuator::{ActuatorBackend, Pulse};
use crate::channel::{Channel, ChannelAllocator, ChannelDescriptor};
use crate::clock::{Pacer, PlaybackClock};
use crate::score::{Event, NoteEvent, Score, Tempo};
use crate::tempo::TempoClock;
use crate::timeline::TrackCursor;
use crate::{HapticError, Result};

/// Equal-tempered frequency of a MIDI pitch, A4 (69) at 440 Hz.
pub fn pitch_to_frequency(pitch: u8) -> f64 {
    440.0 * 2f64.powf((f64::from(pitch) - 69.0) / 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    AllTracksExhausted,
}

/// Everything the loop mutates during a run.
#[derive(Debug, Clone)]
pub struct PlaybackContext<'a> {
    channels: Vec<Channel>,
    tempo: TempoClock,
    cursors: Vec<TrackCursor<'a>>,
}

impl<'a> PlaybackContext<'a> {
    /// Channels are sorted by id so allocation order matches discovery ids.
    pub fn new(score: &'a Score, mut descriptors: Vec<ChannelDescriptor>, tolerance_ms: f64) -> Self {
        descriptors.sort_by_key(|descriptor| descriptor.id);
        Self {
            channels: descriptors
                .into_iter()
                .map(|descriptor| Channel::new(descriptor, tolerance_ms))
                .collect(),
            tempo: TempoClock::new(score.ticks_per_quarter()),
            cursors: score.tracks().iter().map(TrackCursor::new).collect(),
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn tempo(&self) -> &TempoClock {
        &self.tempo
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub ticks: u64,
    pub notes_triggered: usize,
    pub trigger_failures: usize,
    pub notes_dropped_busy: usize,
    pub notes_skipped_malformed: usize,
    pub tempo_changes: usize,
    pub tracks_stopped: usize,
}

pub struct Scheduler<'a, B: ?Sized, C, P> {
    context: PlaybackContext<'a>,
    backend: &'a B,
    clock: C,
    pacer: P,
    volume: f32,
    current_tick: u64,
    stopped_tracks: usize,
    state: SchedulerState,
    report: PlaybackReport,
}

impl<'a, B, C, P> Scheduler<'a, B, C, P>
where
    B: ActuatorBackend + ?Sized,
    C: PlaybackClock,
    P: Pacer,
{
    /// Fails when `volume` lies outside `[0, 1]`.
    pub fn new(
        context: PlaybackContext<'a>,
        backend: &'a B,
        clock: C,
        pacer: P,
        volume: f32,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(HapticError::InvalidInput("volume must lie within [0, 1]"));
        }

        // Empty tracks never yield an event, so they count as stopped up front.
        let stopped_tracks = context
            .cursors
            .iter()
            .filter(|cursor| cursor.is_exhausted())
            .count();

        Ok(Self {
            context,
            backend,
            clock,
            pacer,
            volume,
            current_tick: 0,
            stopped_tracks,
            state: SchedulerState::Running,
            report: PlaybackReport {
                tracks_stopped: stopped_tracks,
                ..Default::default()
            },
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn context(&self) -> &PlaybackContext<'a> {
        &self.context
    }

    pub fn report(&self) -> &PlaybackReport {
        &self.report
    }

    /// Runs until every track is exhausted.
    pub fn run(&mut self) -> PlaybackReport {
        tracing::info!(
            tracks = self.context.cursors.len(),
            channels = self.context.channels.len(),
            division = self.context.tempo.ticks_per_quarter(),
            "playback started"
        );
        while self.step() == SchedulerState::Running {}
        tracing::info!(report = ?self.report, "playback stopped");
        self.report.clone()
    }

    /// Performs one loop iteration: dispatch everything due at the current
    /// tick, then either finish or advance one tick and pace.
    pub fn step(&mut self) -> SchedulerState {
        if self.state == SchedulerState::AllTracksExhausted {
            return self.state;
        }

        let now = self.clock.now();
        let PlaybackContext {
            channels,
            tempo,
            cursors,
        } = &mut self.context;
        let track_count = cursors.len();

        // Ties across tracks resolve in ascending track index.
        for (track, cursor) in cursors.iter_mut().enumerate() {
            if cursor.is_exhausted() {
                continue;
            }

            for timed in cursor.due_events(self.current_tick) {
                match timed.event {
                    Event::Note(note) => dispatch_note(
                        note,
                        channels,
                        tempo,
                        self.backend,
                        self.volume,
                        now,
                        &mut self.report,
                    ),
                    Event::TempoChange(change) => {
                        apply_tempo(change, tempo, self.current_tick, &mut self.report)
                    }
                    Event::EndOfTrack => {}
                }
            }

            if cursor.is_exhausted() {
                self.stopped_tracks += 1;
                self.report.tracks_stopped = self.stopped_tracks;
                tracing::debug!(
                    track,
                    stopped = self.stopped_tracks,
                    total = track_count,
                    "track stopped"
                );
            }
        }

        if self.stopped_tracks == track_count {
            self.state = SchedulerState::AllTracksExhausted;
            return self.state;
        }

        self.current_tick += 1;
        self.report.ticks = self.current_tick;
        self.pacer.wait_tick(tempo.tick_period());
        self.state
    }
}

fn dispatch_note<B: ActuatorBackend + ?Sized>(
    note: NoteEvent,
    channels: &mut [Channel],
    tempo: &TempoClock,
    backend: &B,
    volume: f32,
    now: std::time::Duration,
    report: &mut PlaybackReport,
) {
    let Some(duration_ticks) = note.duration_ticks else {
        tracing::warn!(pitch = note.pitch, "note has no off event, skipping");
        report.notes_skipped_malformed += 1;
        return;
    };

    let duration_ms = tempo.ticks_to_ms(duration_ticks);
    let frequency_hz = pitch_to_frequency(note.pitch);
    let pulse = match Pulse::new(duration_ms / 1000.0, frequency_hz, volume) {
        Ok(pulse) => pulse,
        Err(err) => {
            tracing::warn!(pitch = note.pitch, duration_ticks, %err, "skipping note");
            report.notes_skipped_malformed += 1;
            return;
        }
    };

    let channel_count = channels.len();
    let free = ChannelAllocator::allocate(channels, now)
        .and_then(|id| channels.iter_mut().find(|channel| channel.id() == id));
    let Some(channel) = free else {
        tracing::warn!(
            pitch = note.pitch,
            channels = channel_count,
            "all channels busy, skipping note"
        );
        report.notes_dropped_busy += 1;
        return;
    };

    // The window opens whether or not the trigger succeeds.
    channel.occupy(now, duration_ms);
    match backend.trigger(channel.descriptor(), pulse) {
        Ok(()) => {
            tracing::debug!(
                channel = channel.id(),
                frequency_hz,
                duration_ms,
                "playing note"
            );
            report.notes_triggered += 1;
        }
        Err(err) => {
            tracing::warn!(channel = channel.id(), %err, "actuator dispatch failed");
            report.trigger_failures += 1;
        }
    }
}

fn apply_tempo(change: Tempo, tempo: &mut TempoClock, tick: u64, report: &mut PlaybackReport) {
    let bpm = change.bpm();
    match tempo.apply_tempo_change(bpm) {
        Ok(()) => {
            tracing::debug!(tick, bpm, "new tempo");
            report.tempo_changes += 1;
        }
        Err(err) => tracing::warn!(tick, bpm, %err, "ignoring tempo change"),
    }
}
