use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Constants of the key detector. Defaults reproduce the stock tuning.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct KeyDetectorConfig {
    /// Energy added to a pitch class per note-on, before `sensitivity` scaling.
    pub note_on_energy: f64,
    /// Energy per second accrued by each held note.
    pub sustain_rate: f64,
    /// Half-life values below this are clamped up to it.
    pub min_half_life: f64,
    /// Total energy below which `detect` reports no data.
    pub activity_floor: f64,
    /// A new key must outscore the displayed one by this factor to replace it.
    pub switch_threshold: f64,
    /// Confidence multiplier applied while a challenger is being held off.
    pub hold_confidence_penalty: f64,
    pub tonic_weight: f64,
    pub fifth_weight: f64,
    pub fourth_weight: f64,
    pub third_weight: f64,
    pub scale_tone_weight: f64,
    pub out_of_scale_weight: f64,
}

impl Default for KeyDetectorConfig {
    fn default() -> Self {
        Self {
            note_on_energy: 10.0,
            sustain_rate: 20.0,
            min_half_life: 0.1,
            activity_floor: 5.0,
            switch_threshold: 1.2,
            hold_confidence_penalty: 0.5,
            tonic_weight: 10.0,
            fifth_weight: 7.0,
            fourth_weight: 6.0,
            third_weight: 5.0,
            scale_tone_weight: 2.0,
            out_of_scale_weight: -5.0,
        }
    }
}

/// Weights of the chord template scorer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ChordScoring {
    pub base_score: f64,
    pub extra_penalty: f64,
    pub missing_penalty: f64,
    /// Given back when the perfect fifth is the only missing interval.
    pub fifth_leniency: f64,
    pub match_bonus: f64,
    pub bass_bonus: f64,
    pub confidence_divisor: f64,
    /// Matches at or below this confidence are reported as no chord.
    pub confidence_floor: f64,
}

impl Default for ChordScoring {
    fn default() -> Self {
        Self {
            base_score: 100.0,
            extra_penalty: 60.0,
            missing_penalty: 25.0,
            fifth_leniency: 20.0,
            match_bonus: 10.0,
            bass_bonus: 20.0,
            confidence_divisor: 150.0,
            confidence_floor: 0.3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct EngineTuning {
    pub key: KeyDetectorConfig,
    pub chord: ChordScoring,
}

impl EngineTuning {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow!("Invalid tuning JSON: {}", e))
    }
}

pub fn load_tuning<P: AsRef<Path>>(path: P) -> Result<EngineTuning> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read tuning file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let tuning = EngineTuning::from_json(&text)?;
    debug!("Loaded tuning from {}: {:?}", path.as_ref().display(), tuning);

    Ok(tuning)
}
