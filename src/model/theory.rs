use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub const ROMAN_NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

pub const MAJOR_SCALE: &str = "Major (Ionian)";
pub const MINOR_SCALE: &str = "Minor (Aeolian)";

/// A named scale as semitone offsets from its tonic, tonic first.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub name: &'static str,
    pub intervals: &'static [u8],
}

// -----------------------------------------------------------------------------
// Scale library: diatonic modes, minor variants, pentatonics and a handful of
// 5-8 note "exotic" scales. Order matters for the key detector's tie-break.
// -----------------------------------------------------------------------------

pub const SCALES: &[Scale] = &[
    Scale {
        name: MAJOR_SCALE,
        intervals: &[0, 2, 4, 5, 7, 9, 11],
    },
    Scale {
        name: MINOR_SCALE,
        intervals: &[0, 2, 3, 5, 7, 8, 10],
    },
    Scale {
        name: "Harmonic Minor",
        intervals: &[0, 2, 3, 5, 7, 8, 11],
    },
    Scale {
        name: "Melodic Minor",
        intervals: &[0, 2, 3, 5, 7, 9, 11],
    },
    Scale {
        name: "Dorian",
        intervals: &[0, 2, 3, 5, 7, 9, 10],
    },
    Scale {
        name: "Phrygian",
        intervals: &[0, 1, 3, 5, 7, 8, 10],
    },
    Scale {
        name: "Lydian",
        intervals: &[0, 2, 4, 6, 7, 9, 11],
    },
    Scale {
        name: "Mixolydian",
        intervals: &[0, 2, 4, 5, 7, 9, 10],
    },
    Scale {
        name: "Locrian",
        intervals: &[0, 1, 3, 5, 6, 8, 10],
    },
    Scale {
        name: "Major Pentatonic",
        intervals: &[0, 2, 4, 7, 9],
    },
    Scale {
        name: "Minor Pentatonic",
        intervals: &[0, 3, 5, 7, 10],
    },
    Scale {
        name: "Blues",
        intervals: &[0, 3, 5, 6, 7, 10],
    },
    Scale {
        name: "Whole Tone",
        intervals: &[0, 2, 4, 6, 8, 10],
    },
    Scale {
        name: "Diminished (W-H)",
        intervals: &[0, 2, 3, 5, 6, 8, 9, 11],
    },
    Scale {
        name: "Diminished (H-W)",
        intervals: &[0, 1, 3, 4, 6, 7, 9, 10],
    },
    Scale {
        name: "Augmented",
        intervals: &[0, 3, 4, 7, 8, 11],
    },
    Scale {
        name: "Phrygian Dom.",
        intervals: &[0, 1, 4, 5, 7, 8, 10],
    },
    Scale {
        name: "Double Harmonic",
        intervals: &[0, 1, 4, 5, 7, 8, 11],
    },
    Scale {
        name: "Hungarian Minor",
        intervals: &[0, 2, 3, 6, 7, 8, 11],
    },
    Scale {
        name: "Hirajoshi",
        intervals: &[0, 2, 3, 7, 8],
    },
    Scale {
        name: "In Sen",
        intervals: &[0, 1, 5, 7, 10],
    },
];

/// Exact lookup in the library, accepting the short names "Major" and "Minor".
pub fn find_scale(name: &str) -> Option<&'static Scale> {
    let name = match name {
        "Major" => MAJOR_SCALE,
        "Minor" => MINOR_SCALE,
        other => other,
    };

    SCALES.iter().find(|scale| scale.name == name)
}

/// Like [`find_scale`], but falls back to natural minor for unknown names mentioning
/// "Minor" and to major for everything else.
pub fn scale_or_fallback(name: &str) -> &'static Scale {
    if let Some(scale) = find_scale(name) {
        return scale;
    }

    let fallback = if name.contains("Minor") {
        MINOR_SCALE
    } else {
        MAJOR_SCALE
    };

    find_scale(fallback).unwrap_or(&SCALES[0])
}

/// Parses a root name like `C`, `F#`, `Bb` or `c#` into a pitch class.
pub fn parse_root(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars();
    let letter = chars.next()?.to_ascii_uppercase();

    let natural: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let accidental: i32 = match chars.as_str() {
        "" => 0,
        "#" | "♯" => 1,
        "b" | "♭" => -1,
        _ => return None,
    };

    Some((natural + accidental).rem_euclid(12) as u8)
}

pub fn note_name(pitch_class: u8) -> &'static str {
    NOTE_NAMES[(pitch_class % 12) as usize]
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Maj,
    Min,
    Dim,
    Aug,
    Sus2,
    Sus4,
    Maj7,
    Min7,
    Dom7,
    Dim7,
    HalfDim,
    MinMaj7,
    Aug7,
    Maj7Sharp5,
    Dom7Sus4,
    Maj6,
    Min6,
    Add9,
    MinAdd9,
    Dom9,
    Maj9,
    Min9,
}

impl ChordQuality {
    /// Stable tag used by downstream consumers.
    pub fn tag(&self) -> &'static str {
        match self {
            ChordQuality::Maj => "Maj",
            ChordQuality::Min => "Min",
            ChordQuality::Dim => "Dim",
            ChordQuality::Aug => "Aug",
            ChordQuality::Sus2 => "Sus2",
            ChordQuality::Sus4 => "Sus4",
            ChordQuality::Maj7 => "Maj7",
            ChordQuality::Min7 => "Min7",
            ChordQuality::Dom7 => "Dom7",
            ChordQuality::Dim7 => "Dim7",
            ChordQuality::HalfDim => "HalfDim",
            ChordQuality::MinMaj7 => "MinMaj7",
            ChordQuality::Aug7 => "Aug7",
            ChordQuality::Maj7Sharp5 => "Maj7Sharp5",
            ChordQuality::Dom7Sus4 => "Dom7sus4",
            ChordQuality::Maj6 => "Maj6",
            ChordQuality::Min6 => "Min6",
            ChordQuality::Add9 => "Add9",
            ChordQuality::MinAdd9 => "mAdd9",
            ChordQuality::Dom9 => "Dom9",
            ChordQuality::Maj9 => "Maj9",
            ChordQuality::Min9 => "Min9",
        }
    }

    /// Qualities written with a lowercase Roman numeral.
    pub fn is_minor_like(&self) -> bool {
        matches!(
            self,
            ChordQuality::Min
                | ChordQuality::Min7
                | ChordQuality::Dim
                | ChordQuality::Dim7
                | ChordQuality::HalfDim
                | ChordQuality::Min6
                | ChordQuality::Min9
                | ChordQuality::MinAdd9
        )
    }
}

impl fmt::Display for ChordQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChordTemplate {
    /// Appended to the root name, e.g. `m7` in `Dm7`.
    pub suffix: &'static str,
    pub intervals: &'static [u8],
    pub quality: ChordQuality,
}

// Table order is part of the chord detector's tie-break: on equal scores the
// earlier entry wins.
pub const CHORD_TEMPLATES: &[ChordTemplate] = &[
    // Triads
    ChordTemplate {
        suffix: "",
        intervals: &[0, 4, 7],
        quality: ChordQuality::Maj,
    },
    ChordTemplate {
        suffix: "m",
        intervals: &[0, 3, 7],
        quality: ChordQuality::Min,
    },
    ChordTemplate {
        suffix: "dim",
        intervals: &[0, 3, 6],
        quality: ChordQuality::Dim,
    },
    ChordTemplate {
        suffix: "aug",
        intervals: &[0, 4, 8],
        quality: ChordQuality::Aug,
    },
    ChordTemplate {
        suffix: "sus2",
        intervals: &[0, 2, 7],
        quality: ChordQuality::Sus2,
    },
    ChordTemplate {
        suffix: "sus4",
        intervals: &[0, 5, 7],
        quality: ChordQuality::Sus4,
    },
    // Sevenths
    ChordTemplate {
        suffix: "maj7",
        intervals: &[0, 4, 7, 11],
        quality: ChordQuality::Maj7,
    },
    ChordTemplate {
        suffix: "m7",
        intervals: &[0, 3, 7, 10],
        quality: ChordQuality::Min7,
    },
    ChordTemplate {
        suffix: "7",
        intervals: &[0, 4, 7, 10],
        quality: ChordQuality::Dom7,
    },
    ChordTemplate {
        suffix: "dim7",
        intervals: &[0, 3, 6, 9],
        quality: ChordQuality::Dim7,
    },
    ChordTemplate {
        suffix: "m7b5",
        intervals: &[0, 3, 6, 10],
        quality: ChordQuality::HalfDim,
    },
    ChordTemplate {
        suffix: "mM7",
        intervals: &[0, 3, 7, 11],
        quality: ChordQuality::MinMaj7,
    },
    ChordTemplate {
        suffix: "aug7",
        intervals: &[0, 4, 8, 10],
        quality: ChordQuality::Aug7,
    },
    ChordTemplate {
        suffix: "maj7#5",
        intervals: &[0, 4, 8, 11],
        quality: ChordQuality::Maj7Sharp5,
    },
    ChordTemplate {
        suffix: "7sus4",
        intervals: &[0, 5, 7, 10],
        quality: ChordQuality::Dom7Sus4,
    },
    // Extensions
    ChordTemplate {
        suffix: "6",
        intervals: &[0, 4, 7, 9],
        quality: ChordQuality::Maj6,
    },
    ChordTemplate {
        suffix: "m6",
        intervals: &[0, 3, 7, 9],
        quality: ChordQuality::Min6,
    },
    ChordTemplate {
        suffix: "add9",
        intervals: &[0, 2, 4, 7],
        quality: ChordQuality::Add9,
    },
    ChordTemplate {
        suffix: "m(add9)",
        intervals: &[0, 2, 3, 7],
        quality: ChordQuality::MinAdd9,
    },
    ChordTemplate {
        suffix: "9",
        intervals: &[0, 2, 4, 7, 10],
        quality: ChordQuality::Dom9,
    },
    ChordTemplate {
        suffix: "maj9",
        intervals: &[0, 2, 4, 7, 11],
        quality: ChordQuality::Maj9,
    },
    ChordTemplate {
        suffix: "min9",
        intervals: &[0, 2, 3, 7, 10],
        quality: ChordQuality::Min9,
    },
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scale_lookup_and_fallback() {
        assert_eq!(find_scale("Major").map(|s| s.name), Some(MAJOR_SCALE));
        assert_eq!(find_scale("Minor").map(|s| s.name), Some(MINOR_SCALE));
        assert_eq!(find_scale("Dorian").map(|s| s.intervals.len()), Some(7));
        assert!(find_scale("Super Locrian").is_none());

        assert_eq!(scale_or_fallback("Gypsy Minor").name, MINOR_SCALE);
        assert_eq!(scale_or_fallback("Bebop").name, MAJOR_SCALE);
        assert_eq!(scale_or_fallback("Hirajoshi").name, "Hirajoshi");
    }

    #[test]
    fn scales_start_on_the_tonic() {
        for scale in SCALES {
            assert_eq!(scale.intervals[0], 0, "{}", scale.name);
            assert!((5..=8).contains(&scale.intervals.len()), "{}", scale.name);
            assert!(scale.intervals.windows(2).all(|w| w[0] < w[1]), "{}", scale.name);
        }
    }

    #[test]
    fn root_parsing() {
        assert_eq!(parse_root("C"), Some(0));
        assert_eq!(parse_root("f#"), Some(6));
        assert_eq!(parse_root("Bb"), Some(10));
        assert_eq!(parse_root("Cb"), Some(11));
        assert_eq!(parse_root("H"), None);
        assert_eq!(parse_root("C##"), None);
        assert_eq!(parse_root(""), None);
    }
}
