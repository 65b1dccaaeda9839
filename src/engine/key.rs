use crate::engine::chord::ActiveNotes;
use crate::model::theory::{SCALES, note_name};
use crate::model::tuning::KeyDetectorConfig;
use log::debug;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tonality {
    Major,
    Minor,
}

/// Best-fit key. `confidence` is the relative score gap to the runner-up, 0 meaning "no data".
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub root: u8,
    pub scale_name: &'static str,
    pub confidence: f64,
}

impl KeyEstimate {
    pub fn name(&self) -> String {
        format!("{} {}", note_name(self.root), self.scale_name)
    }

    pub fn tonality(&self) -> Tonality {
        if self.scale_name.contains("Minor") || self.scale_name.contains("Dorian") {
            Tonality::Minor
        } else {
            Tonality::Major
        }
    }

    pub fn has_data(&self) -> bool {
        self.confidence > 0.0
    }
}

/// A scale's weight per semitone offset from the tonic.
#[derive(Debug, Clone)]
struct ScaleProfile {
    name: &'static str,
    weights: [f64; 12],
}

fn build_profiles(config: &KeyDetectorConfig) -> Vec<ScaleProfile> {
    SCALES
        .iter()
        .map(|scale| {
            let mut weights = [config.out_of_scale_weight; 12];

            for (degree, &interval) in scale.intervals.iter().enumerate() {
                weights[interval as usize] = match (degree, interval) {
                    (0, _) => config.tonic_weight,
                    (_, 7) => config.fifth_weight,
                    (_, 5) => config.fourth_weight,
                    (_, 3) | (_, 4) => config.third_weight,
                    _ => config.scale_tone_weight,
                };
            }

            ScaleProfile {
                name: scale.name,
                weights,
            }
        })
        .collect()
}

/// Decaying pitch-class energy accumulator with a hysteresis-stabilized key readout.
///
/// Not thread-safe by intent: hosts with several event sources serialize calls into it.
#[derive(Debug, Clone)]
pub struct KeyDetector {
    config: KeyDetectorConfig,
    profiles: Vec<ScaleProfile>,
    energy: [f64; 12],
    held: ActiveNotes,
    /// (root, profile index) currently on display.
    displayed: Option<(u8, usize)>,
}

impl Default for KeyDetector {
    fn default() -> Self {
        Self::new(KeyDetectorConfig::default())
    }
}

impl KeyDetector {
    pub fn new(config: KeyDetectorConfig) -> Self {
        Self {
            profiles: build_profiles(&config),
            config,
            energy: [0.0; 12],
            held: ActiveNotes::new(),
            displayed: None,
        }
    }

    /// Starts from a given energy distribution, e.g. to replay a saved frame in a test.
    pub fn with_energy(config: KeyDetectorConfig, energy: [f64; 12]) -> Self {
        Self {
            energy,
            ..Self::new(config)
        }
    }

    pub fn energy(&self) -> &[f64; 12] {
        &self.energy
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.iter().sum()
    }

    pub fn is_held(&self, note: u8) -> bool {
        self.held.contains(note)
    }

    pub fn note_on(&mut self, note: u8, channel: u8, sensitivity: f64) {
        self.held.add(note, channel);
        self.energy[(note % 12) as usize] += self.config.note_on_energy * sensitivity;
    }

    /// Stops sustain accrual; energy already gathered fades out through `update`.
    pub fn note_off(&mut self, note: u8, channel: u8) {
        self.held.remove(note, channel);
    }

    /// Drops every held note and all accumulated energy, keeping the displayed key.
    pub fn clear(&mut self) {
        self.held.clear();
        self.energy = [0.0; 12];
    }

    /// Advances by `dt` seconds: held notes accrue sustain energy, then every pitch class decays
    /// by `0.5 ^ (dt / half_life)`.
    ///
    /// `dt` must be non-negative and finite.
    pub fn update(&mut self, dt: f64, half_life: f64) {
        for note in self.held.notes() {
            self.energy[(note % 12) as usize] += self.config.sustain_rate * dt;
        }

        let half_life = half_life.max(self.config.min_half_life);
        let decay = 0.5_f64.powf(dt / half_life);

        for slot in self.energy.iter_mut() {
            *slot *= decay;
        }
    }

    fn score(&self, root: u8, profile: &ScaleProfile) -> f64 {
        (0..12)
            .map(|pc| self.energy[pc] * profile.weights[(pc + 12 - root as usize) % 12])
            .sum()
    }

    fn estimate(&self, (root, profile): (u8, usize), confidence: f64) -> KeyEstimate {
        KeyEstimate {
            root,
            scale_name: self.profiles[profile].name,
            confidence,
        }
    }

    /// Scores every root against every scale profile and returns the displayed key.
    ///
    /// A challenger only takes over the display when it outscores the displayed key, re-scored on
    /// the current energy, by `switch_threshold`; until then the displayed key is kept with its
    /// confidence scaled by `hold_confidence_penalty`. Without enough energy the last key is
    /// returned at zero confidence. Calling this twice without new input gives the same answer.
    pub fn detect(&mut self) -> KeyEstimate {
        let fallback = self.displayed.unwrap_or((0, 0));

        if self.total_energy() < self.config.activity_floor {
            return self.estimate(fallback, 0.0);
        }

        let mut best_score = f64::NEG_INFINITY;
        let mut second_score = f64::NEG_INFINITY;
        let mut best = fallback;

        for root in 0..12u8 {
            for (idx, profile) in self.profiles.iter().enumerate() {
                let score = self.score(root, profile);

                if score > best_score {
                    second_score = best_score;
                    best_score = score;
                    best = (root, idx);
                } else if score > second_score {
                    second_score = score;
                }
            }
        }

        let confidence = if best_score > 0.0 {
            ((best_score - second_score) / best_score).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let Some(displayed) = self.displayed else {
            debug!("Key detected: {} {}", note_name(best.0), self.profiles[best.1].name);
            self.displayed = Some(best);
            return self.estimate(best, confidence);
        };

        if displayed == best {
            return self.estimate(best, confidence);
        }

        let displayed_score = self.score(displayed.0, &self.profiles[displayed.1]);
        if best_score > displayed_score * self.config.switch_threshold {
            debug!(
                "Key switch: {} {} -> {} {} ({:.2} vs {:.2})",
                note_name(displayed.0),
                self.profiles[displayed.1].name,
                note_name(best.0),
                self.profiles[best.1].name,
                best_score,
                displayed_score
            );
            self.displayed = Some(best);
            self.estimate(best, confidence)
        } else {
            self.estimate(displayed, confidence * self.config.hold_confidence_penalty)
        }
    }

    /// The key on display, without rescoring.
    pub fn displayed(&self) -> Option<KeyEstimate> {
        self.displayed.map(|key| self.estimate(key, 0.0))
    }
}
