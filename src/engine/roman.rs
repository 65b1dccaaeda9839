use crate::engine::chord::ChordEstimate;
use crate::model::theory::{ChordQuality, ROMAN_NUMERALS, scale_or_fallback};

/// Shown when a chord root sits a whole step or more from every degree of the key.
pub const UNKNOWN_DEGREE: &str = "?";

/// Conventional Roman-numeral suffix for a quality. Minor-ness is carried by the numeral's case,
/// so minor qualities drop their `m`.
fn roman_suffix(quality: ChordQuality) -> &'static str {
    match quality {
        ChordQuality::Maj | ChordQuality::Min => "",
        ChordQuality::Dim => "°",
        ChordQuality::Aug => "+",
        ChordQuality::Sus2 => "sus2",
        ChordQuality::Sus4 => "sus4",
        ChordQuality::Maj7 => "M7",
        ChordQuality::Min7 | ChordQuality::Dom7 => "7",
        ChordQuality::Dim7 => "°7",
        ChordQuality::HalfDim => "ø7",
        ChordQuality::MinMaj7 => "mM7",
        ChordQuality::Aug7 => "+7",
        ChordQuality::Maj7Sharp5 => "+M7",
        ChordQuality::Dom7Sus4 => "7sus4",
        ChordQuality::Maj6 | ChordQuality::Min6 => "6",
        ChordQuality::Add9 | ChordQuality::MinAdd9 => "(add9)",
        ChordQuality::Dom9 | ChordQuality::Min9 => "9",
        ChordQuality::Maj9 => "M9",
    }
}

/// Scale degree of `chord` in the key `key_root` / `scale_name`, e.g. `V7`, `ii`, `#IV`.
///
/// Roots outside the scale borrow the neighbouring degree a semitone below (written `#`) or,
/// failing that, above (written `b`). Unknown scale names fall back to natural minor when they
/// mention "Minor" and to major otherwise.
pub fn to_roman(chord: &ChordEstimate, key_root: u8, scale_name: &str) -> String {
    let intervals = scale_or_fallback(scale_name).intervals;
    let relative = (chord.root % 12 + 12 - key_root % 12) % 12;

    let degree_of = |interval: u8| intervals.iter().position(|&i| i == interval);

    let (degree, accidental) = match degree_of(relative) {
        Some(degree) => (degree, ""),
        None => {
            if let Some(degree) = degree_of((relative + 11) % 12) {
                (degree, "#")
            } else if let Some(degree) = degree_of((relative + 1) % 12) {
                (degree, "b")
            } else {
                return UNKNOWN_DEGREE.to_owned();
            }
        }
    };

    let Some(numeral) = ROMAN_NUMERALS.get(degree) else {
        return UNKNOWN_DEGREE.to_owned();
    };

    let numeral = if chord.quality.is_minor_like() {
        numeral.to_lowercase()
    } else {
        numeral.to_string()
    };

    format!("{}{}{}", accidental, numeral, roman_suffix(chord.quality))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::chord::ChordDetector;
    use crate::model::theory::MAJOR_SCALE;

    fn chord(notes: &[u8]) -> ChordEstimate {
        ChordDetector::default().detect_notes(notes).unwrap()
    }

    #[test]
    fn diatonic_triads_in_c_major() {
        assert_eq!(to_roman(&chord(&[60, 64, 67]), 0, MAJOR_SCALE), "I");
        assert_eq!(to_roman(&chord(&[67, 71, 74]), 0, MAJOR_SCALE), "V");
        assert_eq!(to_roman(&chord(&[62, 65, 69]), 0, MAJOR_SCALE), "ii");
        assert_eq!(to_roman(&chord(&[71, 74, 77]), 0, "Major"), "vii°");
    }

    #[test]
    fn sevenths_use_conventional_suffixes() {
        assert_eq!(to_roman(&chord(&[55, 59, 62, 65]), 0, MAJOR_SCALE), "V7");
        assert_eq!(to_roman(&chord(&[60, 64, 67, 71]), 0, MAJOR_SCALE), "IM7");
        assert_eq!(to_roman(&chord(&[62, 65, 69, 72]), 0, MAJOR_SCALE), "ii7");
        assert_eq!(to_roman(&chord(&[59, 62, 65, 69]), 0, MAJOR_SCALE), "viiø7");
    }

    #[test]
    fn borrowed_roots_take_an_accidental() {
        // Db major in C: a semitone above the tonic
        let db = chord(&[61, 65, 68]);
        assert_eq!(to_roman(&db, 0, MAJOR_SCALE), "#I");

        // F# major in C: a semitone above IV
        let fs = chord(&[66, 70, 73]);
        assert_eq!(to_roman(&fs, 0, MAJOR_SCALE), "#IV");

        // Bb major in C harmonic minor: A is not a degree, but B is
        let bb = chord(&[58, 62, 65]);
        assert_eq!(to_roman(&bb, 0, "Harmonic Minor"), "bVII");
    }

    #[test]
    fn secondary_dominant_root_stays_diatonic() {
        // D major in C: the root is degree II, the major quality keeps it uppercase
        let d = chord(&[62, 66, 69]);
        assert_eq!(to_roman(&d, 0, MAJOR_SCALE), "II");
    }

    #[test]
    fn unreachable_root_is_unknown() {
        // Hirajoshi on C has nothing within a semitone of F
        let f = chord(&[65, 69, 72]);
        assert_eq!(to_roman(&f, 0, "Hirajoshi"), UNKNOWN_DEGREE);
    }

    #[test]
    fn key_root_is_relative() {
        // A minor chord in A minor, E major chord in A harmonic minor
        assert_eq!(to_roman(&chord(&[57, 60, 64]), 9, "Minor"), "i");
        assert_eq!(to_roman(&chord(&[64, 68, 71]), 9, "Harmonic Minor"), "V");
    }

    #[test]
    fn unknown_scale_names_fall_back() {
        let c_minor = chord(&[60, 63, 67]);
        let eb = chord(&[63, 67, 70]);

        assert_eq!(to_roman(&eb, 0, "Some Minor"), "III");
        assert_eq!(to_roman(&c_minor, 0, "Mystery"), "i");
        assert_eq!(to_roman(&eb, 0, "Mystery"), "#II");
    }
}
