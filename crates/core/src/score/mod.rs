use std::collections::{HashMap, VecDeque};
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::Serialize;

use crate::{HapticError, Result};

/// Microseconds per minute, used to convert set-tempo meta events.
const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Tempo carried by a tempo change event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tempo {
    MicrosPerQuarter(u32),
    Bpm(f64),
}

impl Tempo {
    /// Returns the tempo in beats per minute. A zero microsecond value maps
    /// to an infinite tempo, which the tempo clock refuses.
    pub fn bpm(self) -> f64 {
        match self {
            Tempo::MicrosPerQuarter(micros) => MICROS_PER_MINUTE / f64::from(micros),
            Tempo::Bpm(bpm) => bpm,
        }
    }
}

/// A note-on paired with its note-off. `duration_ticks` is `None` when the
/// score never released the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub duration_ticks: Option<u64>,
}

impl NoteEvent {
    pub fn new(pitch: u8, duration_ticks: u64) -> Self {
        Self {
            pitch,
            duration_ticks: Some(duration_ticks),
        }
    }

    /// A note whose off event is missing from the score.
    pub fn unterminated(pitch: u8) -> Self {
        Self {
            pitch,
            duration_ticks: None,
        }
    }

    pub fn has_off_event(&self) -> bool {
        self.duration_ticks.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Note(NoteEvent),
    TempoChange(Tempo),
    /// Marks the end of a track; keeps the track alive until its tick.
    EndOfTrack,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    /// Absolute tick from the start of the score.
    pub tick: u64,
    pub event: Event,
}

impl TimedEvent {
    pub fn new(tick: u64, event: Event) -> Self {
        Self { tick, event }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    events: Vec<TimedEvent>,
}

impl Track {
    pub fn new(events: Vec<TimedEvent>) -> Self {
        Self { name: None, events }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// In-memory score: tracks of absolute-tick events plus the fixed
/// ticks-per-quarter-note division.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    ticks_per_quarter: u16,
    tracks: Vec<Track>,
}

impl Score {
    /// Builds a score, checking the division and that every track is sorted
    /// by non-decreasing tick.
    pub fn new(ticks_per_quarter: u16, tracks: Vec<Track>) -> Result<Self> {
        if ticks_per_quarter == 0 {
            return Err(HapticError::InvalidInput(
                "ticks per quarter note must be positive",
            ));
        }
        let sorted = tracks
            .iter()
            .all(|track| track.events.windows(2).all(|w| w[0].tick <= w[1].tick));
        if !sorted {
            return Err(HapticError::InvalidInput(
                "track events must be ordered by tick",
            ));
        }
        Ok(Self {
            ticks_per_quarter,
            tracks,
        })
    }

    /// Reads and decodes a Standard MIDI File from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HapticError::msg(format!(
                "score file `{}` does not exist",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        Self::from_smf_bytes(&bytes)
    }

    /// Decodes a Standard MIDI File. Only metrical timing is supported.
    pub fn from_smf_bytes(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(division) => division.as_int(),
            Timing::Timecode(fps, sub) => {
                return Err(HapticError::UnsupportedTiming(format!(
                    "SMPTE timecode at {} fps with {sub} subframes",
                    fps.as_int()
                )))
            }
        };

        let tracks = smf.tracks.iter().map(|raw| decode_track(raw)).collect();
        Self::new(ticks_per_quarter, tracks)
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn summary(&self) -> ScoreSummary {
        let mut summary = ScoreSummary {
            ticks_per_quarter: self.ticks_per_quarter,
            tracks: self.tracks.len(),
            ..Default::default()
        };

        for timed in self.tracks.iter().flat_map(|track| track.events.iter()) {
            summary.length_ticks = summary.length_ticks.max(timed.tick);
            match timed.event {
                Event::Note(note) if note.has_off_event() => summary.notes += 1,
                Event::Note(_) => summary.malformed_notes += 1,
                Event::TempoChange(_) => summary.tempo_changes += 1,
                Event::EndOfTrack => {}
            }
        }

        summary
    }
}

/// Counts reported by `inspect` and logged before playback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub ticks_per_quarter: u16,
    pub tracks: usize,
    pub notes: usize,
    pub malformed_notes: usize,
    pub tempo_changes: usize,
    pub length_ticks: u64,
}

fn decode_track(raw: &[midly::TrackEvent<'_>]) -> Track {
    let mut track = Track::default();
    // Open notes per (MIDI channel, key), released first-in first-out.
    let mut open: HashMap<(u8, u8), VecDeque<usize>> = HashMap::new();
    let mut tick = 0u64;

    for raw_event in raw {
        tick += u64::from(raw_event.delta.as_int());
        match raw_event.kind {
            TrackEventKind::Midi { channel, message } => {
                let (key, on) = match message {
                    MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int() > 0),
                    MidiMessage::NoteOff { key, .. } => (key.as_int(), false),
                    _ => continue,
                };
                let slot = (channel.as_int(), key);
                if on {
                    open.entry(slot).or_default().push_back(track.events.len());
                    track.events.push(TimedEvent::new(
                        tick,
                        Event::Note(NoteEvent::unterminated(key)),
                    ));
                } else if let Some(index) = open.get_mut(&slot).and_then(VecDeque::pop_front) {
                    let start = track.events[index].tick;
                    if let Event::Note(note) = &mut track.events[index].event {
                        note.duration_ticks = Some(tick - start);
                    }
                }
            }
            TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                track.events.push(TimedEvent::new(
                    tick,
                    Event::TempoChange(Tempo::MicrosPerQuarter(micros.as_int())),
                ));
            }
            TrackEventKind::Meta(MetaMessage::TrackName(name)) if track.name.is_none() => {
                track.name = Some(String::from_utf8_lossy(name).into_owned());
            }
            TrackEventKind::Meta(MetaMessage::EndOfTrack) => {
                track.events.push(TimedEvent::new(tick, Event::EndOfTrack));
            }
            _ => {}
        }
    }

    track
}
