use crate::model::song::{Measure, NoteEvent, NoteEventKind};
use crate::model::theory::MAJOR_SCALE;
use crate::model::tuning::EngineTuning;
use crate::timeline::{BarPosition, MeasureMap, Page};
use log::debug;
use serde::Serialize;

pub mod chord;
pub mod json_sink;
pub mod key;
pub mod log_sink;
pub mod roman;

use chord::{ActiveNotes, ChordDetector, ChordEstimate};
use key::{KeyDetector, KeyEstimate};

pub const ALL_CHANNELS: u16 = 0xFFFF;
pub const DEFAULT_PERCUSSION_CHANNEL: u8 = 9;

/// Receives one analysis frame per host tick; the rendering side of the engine.
pub trait FrameSink: Send + Sync {
    fn present(&self, frame: &Frame) -> anyhow::Result<()>;

    /// Called once playback ends or is stopped.
    fn finish(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
    /// Chord symbols such as `Am7` or `C/E`.
    #[default]
    Name,
    /// Scale degrees such as `vi7` relative to the current key.
    Roman,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum KeySelection {
    /// Follow the key detector.
    Auto,
    /// A user-chosen key; the detector still runs but only for display.
    Fixed { root: u8, scale: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub mode: LabelMode,
    pub key: KeySelection,
    /// Multiplier on note-on energy.
    pub sensitivity: f64,
    pub half_life: f64,
    /// Bit `n` enables MIDI channel `n`.
    pub channel_mask: u16,
    /// 0-based; notes on this channel never reach the detectors.
    pub percussion_channel: u8,
    pub measures_per_page: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            mode: LabelMode::Name,
            key: KeySelection::Auto,
            sensitivity: 1.0,
            half_life: 3.0,
            channel_mask: ALL_CHANNELS,
            percussion_channel: DEFAULT_PERCUSSION_CHANNEL,
            measures_per_page: 1,
        }
    }
}

impl AnalysisSettings {
    pub fn accepts_channel(&self, channel: u8) -> bool {
        channel < 16
            && (self.channel_mask >> channel) & 1 == 1
            && channel != self.percussion_channel
    }
}

/// Everything a renderer needs to draw one frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: f64,
    pub measure: Option<Measure>,
    pub bar: Option<BarPosition>,
    pub page: Option<Page>,
    pub key: KeyEstimate,
    /// Empty until a key has been detected at least once.
    pub key_name: String,
    pub chord: Option<ChordEstimate>,
    /// Chord name or Roman numeral, empty without a chord.
    pub label: String,
}

/// Combines the key and chord detectors behind the host's note stream and clock.
#[derive(Debug, Clone)]
pub struct Analyzer {
    settings: AnalysisSettings,
    key: KeyDetector,
    chords: ChordDetector,
    active: ActiveNotes,
    chord_override: Option<String>,
}

impl Analyzer {
    pub fn new(settings: AnalysisSettings, tuning: EngineTuning) -> Self {
        Self {
            settings,
            key: KeyDetector::new(tuning.key),
            chords: ChordDetector::new(tuning.chord),
            active: ActiveNotes::new(),
            chord_override: None,
        }
    }

    pub fn key_detector(&self) -> &KeyDetector {
        &self.key
    }

    pub fn active_notes(&self) -> &ActiveNotes {
        &self.active
    }

    /// Routes one note message to both detectors, honouring the channel mask and skipping
    /// percussion. Returns whether the event was accepted.
    pub fn handle(&mut self, event: &NoteEvent) -> bool {
        if !self.settings.accepts_channel(event.channel) {
            return false;
        }

        if event.is_release() {
            self.active.remove(event.note, event.channel);
            self.key.note_off(event.note, event.channel);
        } else if event.kind == NoteEventKind::NoteOn {
            self.active.add(event.note, event.channel);
            self.key.note_on(event.note, event.channel, self.settings.sensitivity);
        }

        true
    }

    /// Advances the key detector's sustain and decay by `dt` seconds of transport time.
    pub fn advance(&mut self, dt: f64) {
        self.key.update(dt, self.settings.half_life);
    }

    /// Label from a remote analysis service; replaces the chord name but never the key.
    pub fn set_chord_override(&mut self, label: Option<String>) {
        if label != self.chord_override {
            debug!("Chord label override: {:?}", label);
        }
        self.chord_override = label;
    }

    /// Releases every held note, e.g. after a seek.
    pub fn reset_notes(&mut self) {
        self.active.clear();
        self.key.clear();
    }

    pub fn detect_key(&mut self) -> KeyEstimate {
        self.key.detect()
    }

    pub fn detect_chord(&self) -> Option<ChordEstimate> {
        self.chords.detect(&self.active)
    }

    /// The key Roman numerals are measured against.
    pub fn reference_key(&self, detected: &KeyEstimate) -> (u8, String) {
        match &self.settings.key {
            KeySelection::Auto => (detected.root, detected.scale_name.to_owned()),
            KeySelection::Fixed { root, scale } => (*root % 12, scale.clone()),
        }
    }

    pub fn label(&self, chord: Option<&ChordEstimate>, key: &KeyEstimate) -> String {
        let Some(chord) = chord else {
            return String::new();
        };

        match self.settings.mode {
            LabelMode::Name => self
                .chord_override
                .clone()
                .unwrap_or_else(|| chord.name()),
            LabelMode::Roman => {
                let (root, scale) = self.reference_key(key);
                roman::to_roman(chord, root, &scale)
            }
        }
    }

    /// Builds the frame for transport time `time` against the piece's measure map.
    pub fn frame(&mut self, time: f64, measures: &MeasureMap) -> Frame {
        let key = self.detect_key();
        let chord = self.detect_chord();
        let label = self.label(chord.as_ref(), &key);

        Frame {
            time,
            measure: measures.measure_at(time).copied(),
            bar: measures.bar_position(time),
            page: measures.page_at(time, self.settings.measures_per_page),
            key_name: if self.key.displayed().is_some() {
                key.name()
            } else {
                String::new()
            },
            key,
            chord,
            label,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisSettings::default(), EngineTuning::default())
    }
}

pub fn fixed_key(root: u8, scale: Option<&str>) -> KeySelection {
    KeySelection::Fixed {
        root: root % 12,
        scale: scale.unwrap_or(MAJOR_SCALE).to_owned(),
    }
}
