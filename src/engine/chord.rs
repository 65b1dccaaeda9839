use crate::model::theory::{CHORD_TEMPLATES, ChordQuality, ChordTemplate, note_name};
use crate::model::tuning::ChordScoring;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const PERFECT_FIFTH: u8 = 7;

/// Notes currently held, by absolute MIDI number.
///
/// A note stays held while any channel still holds it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNotes {
    /// Bit `n` of the value is set while channel `n` holds the note.
    notes: BTreeMap<u8, u16>,
}

impl ActiveNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, note: u8, channel: u8) {
        *self.notes.entry(note).or_default() |= channel_bit(channel);
    }

    pub fn remove(&mut self, note: u8, channel: u8) {
        if let Some(channels) = self.notes.get_mut(&note) {
            *channels &= !channel_bit(channel);
            if *channels == 0 {
                self.notes.remove(&note);
            }
        }
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    /// Distinct held notes.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn contains(&self, note: u8) -> bool {
        self.notes.contains_key(&note)
    }

    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes.keys().copied()
    }

    /// Lowest held note.
    pub fn bass(&self) -> Option<u8> {
        self.notes.first_key_value().map(|(note, _)| *note)
    }

    /// Distinct pitch classes, ascending.
    pub fn pitch_classes(&self) -> Vec<u8> {
        let pcs: BTreeSet<u8> = self.notes.keys().map(|note| note % 12).collect();
        pcs.into_iter().collect()
    }
}

fn channel_bit(channel: u8) -> u16 {
    1 << (channel & 0x0F)
}

/// Collects notes as held on channel 0.
impl FromIterator<u8> for ActiveNotes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut active = Self::new();
        for note in iter {
            active.add(note, 0);
        }
        active
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChordEstimate {
    pub root: u8,
    pub bass: u8,
    pub quality: ChordQuality,
    pub suffix: &'static str,
    pub confidence: f64,
}

impl ChordEstimate {
    /// `<root><suffix>`, with `/<bass>` appended whenever the bass is not the root.
    pub fn name(&self) -> String {
        let mut name = format!("{}{}", note_name(self.root), self.suffix);
        if self.bass != self.root {
            name.push('/');
            name.push_str(note_name(self.bass));
        }
        name
    }

    pub fn is_inverted(&self) -> bool {
        self.bass != self.root
    }
}

/// Template-matching chord classifier.
#[derive(Debug, Clone, Default)]
pub struct ChordDetector {
    scoring: ChordScoring,
}

impl ChordDetector {
    pub fn new(scoring: ChordScoring) -> Self {
        Self { scoring }
    }

    fn score(
        &self,
        present: &[bool; 12],
        present_count: usize,
        template: &ChordTemplate,
        root_is_bass: bool,
    ) -> f64 {
        let s = &self.scoring;

        let mut matched = 0usize;
        let mut missing = 0usize;
        let mut missing_fifth = false;

        for &interval in template.intervals {
            if present[interval as usize] {
                matched += 1;
            } else {
                missing += 1;
                missing_fifth |= interval == PERFECT_FIFTH;
            }
        }
        let extra = present_count - matched;

        let mut score = s.base_score;
        score -= extra as f64 * s.extra_penalty;
        score -= missing as f64 * s.missing_penalty;
        if missing == 1 && missing_fifth {
            score += s.fifth_leniency;
        }
        score += matched as f64 * s.match_bonus;
        if root_is_bass {
            score += s.bass_bonus;
        }

        score
    }

    /// Best-fitting chord for the held notes, or `None` below two pitch classes or the
    /// confidence floor.
    ///
    /// Every present pitch class is tried as root (ascending) against every template (table
    /// order); the first strictly highest score wins, so equal scores resolve to the lower root
    /// and then the earlier template.
    pub fn detect(&self, active: &ActiveNotes) -> Option<ChordEstimate> {
        let bass = active.bass()? % 12;
        let pcs = active.pitch_classes();
        if pcs.len() < 2 {
            return None;
        }

        let mut best: Option<(f64, u8, &'static ChordTemplate)> = None;

        for &root in pcs.iter() {
            let mut present = [false; 12];
            for &pc in pcs.iter() {
                present[((pc + 12 - root) % 12) as usize] = true;
            }

            for template in CHORD_TEMPLATES {
                let score = self.score(&present, pcs.len(), template, root == bass);
                if best.is_none_or(|(top, _, _)| score > top) {
                    best = Some((score, root, template));
                }
            }
        }

        let (score, root, template) = best?;
        let confidence = (score / self.scoring.confidence_divisor).clamp(0.0, 1.0);
        if confidence <= self.scoring.confidence_floor {
            return None;
        }

        Some(ChordEstimate {
            root,
            bass,
            quality: template.quality,
            suffix: template.suffix,
            confidence,
        })
    }

    pub fn detect_notes(&self, notes: &[u8]) -> Option<ChordEstimate> {
        let active: ActiveNotes = notes.iter().copied().collect();
        self.detect(&active)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn detect(notes: &[u8]) -> Option<ChordEstimate> {
        ChordDetector::default().detect_notes(notes)
    }

    #[test]
    fn c_major_triad() {
        let chord = detect(&[60, 64, 67]).unwrap();
        assert_eq!(chord.name(), "C");
        assert_eq!(chord.quality, ChordQuality::Maj);
        assert_eq!(chord.quality.tag(), "Maj");
        assert!(chord.confidence >= 0.9);
        assert!(!chord.is_inverted());
    }

    #[test]
    fn d_minor_triad() {
        let chord = detect(&[62, 65, 69]).unwrap();
        assert_eq!(chord.name(), "Dm");
        assert_eq!((chord.root, chord.bass), (2, 2));
    }

    #[test]
    fn c_major_seventh() {
        assert_eq!(detect(&[60, 64, 67, 71]).unwrap().name(), "Cmaj7");
    }

    #[test]
    fn dominant_and_half_diminished_sevenths() {
        assert_eq!(detect(&[55, 59, 62, 65]).unwrap().name(), "G7");
        assert_eq!(detect(&[59, 62, 65, 69]).unwrap().name(), "Bm7b5");
    }

    #[test]
    fn inversion_uses_slash_notation() {
        let chord = detect(&[67, 72, 75]).unwrap();
        assert_eq!(chord.name(), "Cm/G");
        assert_eq!(chord.bass, 7);
        assert!(chord.is_inverted());
    }

    #[test]
    fn doubled_notes_collapse_to_pitch_classes() {
        let chord = detect(&[48, 60, 64, 72, 76, 79]).unwrap();
        assert_eq!(chord.name(), "C");
    }

    #[test]
    fn missing_fifth_is_lenient() {
        // C E Bb: only the fifth of C7 is missing
        let chord = detect(&[60, 64, 70]).unwrap();
        assert_eq!(chord.name(), "C7");
    }

    #[test]
    fn single_pitch_class_is_no_chord() {
        assert!(detect(&[60]).is_none());
        assert!(detect(&[60, 72, 84]).is_none());
        assert!(detect(&[]).is_none());
    }

    #[test]
    fn clusters_fall_below_the_floor() {
        assert!(detect(&[60, 61, 62, 63, 64, 65, 66]).is_none());
    }

    #[test]
    fn ties_resolve_to_lowest_root_then_table_order() {
        // symmetric chords score identically on every root once the bass bonus is gone
        let detector = ChordDetector::new(ChordScoring {
            bass_bonus: 0.0,
            ..ChordScoring::default()
        });

        // C Eb Gb A: every note is the root of a full dim7, all scoring alike
        let chord = detector.detect_notes(&[66, 69, 72, 75]).unwrap();
        assert_eq!(chord.root, 0);
        assert_eq!(chord.quality, ChordQuality::Dim7);
        assert_eq!(chord.name(), "Cdim7/F#");

        // C E G#: augmented triads on C, E and G# tie
        let aug = detector.detect_notes(&[64, 68, 72]).unwrap();
        assert_eq!(aug.root, 0);
        assert_eq!(aug.quality, ChordQuality::Aug);
    }

    #[test]
    fn active_notes_track_bass_and_pitch_classes() {
        let mut active = ActiveNotes::new();
        active.add(67, 0);
        active.add(60, 0);
        active.add(72, 0);
        active.add(64, 0);

        assert_eq!(active.bass(), Some(60));
        assert_eq!(active.pitch_classes(), vec![0, 4, 7]);

        active.remove(60, 0);
        assert_eq!(active.bass(), Some(64));
        assert_eq!(active.len(), 3);

        active.clear();
        assert!(active.is_empty());
        assert_eq!(active.bass(), None);
    }

    #[test]
    fn a_note_held_on_two_channels_needs_both_releases() {
        let mut active = ActiveNotes::new();
        active.add(60, 0);
        active.add(60, 3);
        active.add(64, 3);

        active.remove(60, 0);
        assert!(active.contains(60));
        assert_eq!(active.bass(), Some(60));

        // releasing on a channel that never held it changes nothing
        active.remove(64, 0);
        assert!(active.contains(64));

        active.remove(60, 3);
        assert!(!active.contains(60));
        assert_eq!(active.bass(), Some(64));
    }
}
