use crate::score::{TimedEvent, Track};

/// Position of a cursor within its track.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub next_event_index: usize,
    pub exhausted: bool,
}

/// Walks one track, handing out events as their tick arrives.
#[derive(Debug, Clone)]
pub struct TrackCursor<'a> {
    events: &'a [TimedEvent],
    position: PlaybackCursor,
}

impl<'a> TrackCursor<'a> {
    /// An empty track starts out exhausted.
    pub fn new(track: &'a Track) -> Self {
        Self::from_events(track.events())
    }

    pub fn from_events(events: &'a [TimedEvent]) -> Self {
        Self {
            events,
            position: PlaybackCursor {
                next_event_index: 0,
                exhausted: events.is_empty(),
            },
        }
    }

    pub fn position(&self) -> PlaybackCursor {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position.exhausted
    }

    /// Yields every event at or before `current_tick` that has not been
    /// yielded yet, in stored order.
    pub fn due_events(&mut self, current_tick: u64) -> DueEvents<'_, 'a> {
        DueEvents {
            cursor: self,
            current_tick,
        }
    }
}

/// Iterator returned by [`TrackCursor::due_events`].
#[derive(Debug)]
pub struct DueEvents<'c, 'a> {
    cursor: &'c mut TrackCursor<'a>,
    current_tick: u64,
}

impl Iterator for DueEvents<'_, '_> {
    type Item = TimedEvent;

    fn next(&mut self) -> Option<TimedEvent> {
        let position = &mut self.cursor.position;
        if position.exhausted {
            return None;
        }

        let event = *self.cursor.events.get(position.next_event_index)?;
        if event.tick > self.current_tick {
            return None;
        }

        position.next_event_index += 1;
        if position.next_event_index == self.cursor.events.len() {
            position.exhausted = true;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Event, NoteEvent};

    fn note(tick: u64, pitch: u8) -> TimedEvent {
        TimedEvent::new(tick, Event::Note(NoteEvent::new(pitch, 10)))
    }

    #[test]
    fn yields_nothing_before_first_event() {
        let events = [note(5, 60)];
        let mut cursor = TrackCursor::from_events(&events);

        assert_eq!(cursor.due_events(4).count(), 0);
        assert_eq!(cursor.position().next_event_index, 0);
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn yields_simultaneous_events_in_stored_order() {
        let events = [
            TimedEvent::new(0, Event::EndOfTrack),
            note(3, 60),
            note(3, 64),
            note(3, 67),
            note(9, 72),
        ];
        let mut cursor = TrackCursor::from_events(&events);

        assert_eq!(cursor.due_events(0).count(), 1);
        let due: Vec<_> = cursor.due_events(3).collect();
        assert_eq!(due, events[1..4].to_vec());
        assert_eq!(cursor.position().next_event_index, 4);
    }

    #[test]
    fn catches_up_on_every_overdue_event() {
        let events = [note(1, 60), note(2, 61), note(3, 62)];
        let mut cursor = TrackCursor::from_events(&events);

        assert_eq!(cursor.due_events(10).count(), 3);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn exhausted_cursor_stays_done() {
        let events = [note(0, 60)];
        let mut cursor = TrackCursor::from_events(&events);

        assert_eq!(cursor.due_events(0).count(), 1);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.due_events(100).count(), 0);
        assert_eq!(cursor.position().next_event_index, 1);
    }

    #[test]
    fn empty_track_is_exhausted_immediately() {
        let track = Track::default();
        let cursor = TrackCursor::new(&track);
        assert!(cursor.is_exhausted());
    }
}
