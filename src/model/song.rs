use serde::{Deserialize, Serialize};

/// Window past the playhead in which a note still counts as sounding.
const ACTIVE_WINDOW_LEAD_S: f64 = 0.05;

/// A tempo change at an absolute tick.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub tick: u64,
    pub bpm: f64,
}

/// A time signature change at an absolute tick.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterEvent {
    pub tick: u64,
    pub numerator: u32,
    pub denominator: u32,
}

impl MeterEvent {
    pub const COMMON_TIME: MeterEvent = MeterEvent {
        tick: 0,
        numerator: 4,
        denominator: 4,
    };

    pub fn is_valid(&self) -> bool {
        self.numerator >= 1 && matches!(self.denominator, 1 | 2 | 4 | 8 | 16 | 32)
    }
}

/// One bar of the timeline, derived from the tempo and meter events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub start_tick: u64,
    pub numerator: u32,
    pub denominator: u32,
    /// Tempo in effect at `start_tick`.
    pub bpm: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A single message of the live note stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    /// Seconds on the host's transport clock.
    pub timestamp: f64,
}

impl NoteEvent {
    pub fn note_on(note: u8, velocity: u8, channel: u8, timestamp: f64) -> Self {
        Self {
            kind: NoteEventKind::NoteOn,
            note,
            velocity,
            channel,
            timestamp,
        }
    }

    pub fn note_off(note: u8, channel: u8, timestamp: f64) -> Self {
        Self {
            kind: NoteEventKind::NoteOff,
            note,
            velocity: 0,
            channel,
            timestamp,
        }
    }

    /// A note-on with velocity 0 releases the note, as in running-status MIDI.
    pub fn is_release(&self) -> bool {
        self.kind == NoteEventKind::NoteOff || self.velocity == 0
    }
}

/// A note of a loaded piece, positioned in both tick and second space.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteSpan {
    pub midi: u8,
    pub velocity: u8,
    pub channel: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub time: f64,
    pub duration: f64,
}

impl NoteSpan {
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub ppq: u32,
    pub tempos: Vec<TempoEvent>,
    pub meters: Vec<MeterEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Song {
    pub metadata: Metadata,
    /// Sorted by start time.
    pub notes: Vec<NoteSpan>,
    pub duration: f64,
}

impl Song {
    /// Notes sounding in `[time - lookback, time + 0.05)`, skipping the percussion channel.
    pub fn notes_active_at(
        &self,
        time: f64,
        lookback: f64,
        percussion_channel: u8,
    ) -> Vec<NoteSpan> {
        let window_start = time - lookback.max(0.0);
        let window_end = time + ACTIVE_WINDOW_LEAD_S;

        self.notes
            .iter()
            .take_while(|note| note.time <= window_end)
            .filter(|note| note.channel != percussion_channel)
            .filter(|note| note.end_time() > window_start && note.time < window_end)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn span(midi: u8, channel: u8, time: f64, duration: f64) -> NoteSpan {
        NoteSpan {
            midi,
            velocity: 100,
            channel,
            start_tick: 0,
            end_tick: 0,
            time,
            duration,
        }
    }

    #[test]
    fn active_notes_skip_percussion_and_finished_notes() {
        let song = Song {
            notes: vec![
                span(60, 0, 0.0, 0.5),
                span(36, 9, 0.9, 0.1),
                span(64, 0, 0.8, 1.0),
                span(67, 1, 1.02, 0.5),
                span(72, 0, 3.0, 1.0),
            ],
            duration: 4.0,
            ..Default::default()
        };

        let active: Vec<u8> = song
            .notes_active_at(1.0, 0.0, 9)
            .iter()
            .map(|n| n.midi)
            .collect();
        assert_eq!(active, vec![64, 67]);

        let with_lookback: Vec<u8> = song
            .notes_active_at(1.0, 0.6, 9)
            .iter()
            .map(|n| n.midi)
            .collect();
        assert_eq!(with_lookback, vec![60, 64, 67]);
    }

    #[test]
    fn velocity_zero_note_on_is_a_release() {
        assert!(NoteEvent::note_on(60, 0, 0, 0.0).is_release());
        assert!(NoteEvent::note_off(60, 0, 0.0).is_release());
        assert!(!NoteEvent::note_on(60, 1, 0, 0.0).is_release());
    }

    #[test]
    fn meter_validation() {
        assert!(MeterEvent::COMMON_TIME.is_valid());
        let meter = |numerator, denominator| MeterEvent {
            tick: 0,
            numerator,
            denominator,
        };

        assert!(meter(7, 8).is_valid());
        assert!(meter(1, 32).is_valid());
        assert!(!meter(0, 4).is_valid());
        assert!(!meter(3, 3).is_valid());
    }
}
