use crate::engine::{AnalysisSettings, DEFAULT_PERCUSSION_CHANNEL};
use crate::util::{parse_channel_mask, parse_key_selection, parse_mode};
use clap::Parser;
use log::warn;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "midi_navigate",
    about = "Follow a MIDI file measure by measure with live key and chord analysis."
)]
pub struct Args {
    /// Path to the target MIDI file.
    pub midi: PathBuf,

    /// Transpose in semitones (positive or negative).
    #[arg(short, long, default_value_t = 0)]
    pub transpose: i32,

    /// Chord label style: name|roman.
    #[arg(short, long, default_value = "name")]
    pub mode: String,

    /// Fixed key root for Roman numerals (e.g. `D`, `Bb`). Detected when omitted.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Scale of the fixed key, e.g. "Major", "Minor" or "Dorian".
    #[arg(short, long)]
    pub scale: Option<String>,

    /// Multiplier on the energy each note-on adds to the key detector.
    #[arg(long, default_value_t = 1.0)]
    pub sensitivity: f64,

    /// Seconds for released notes to lose half their key energy.
    #[arg(long = "half-life", default_value_t = 3.0)]
    pub half_life: f64,

    /// Enabled MIDI channels as a bitmask (`all`, `0x00ff`, `255`).
    #[arg(long = "channel-mask", default_value = "all")]
    pub channel_mask: String,

    /// 1-based percussion channel, ignored by both detectors.
    #[arg(long = "percussion-channel", default_value_t = DEFAULT_PERCUSSION_CHANNEL + 1)]
    pub percussion_channel: u8,

    /// Measures shown per page.
    #[arg(long = "measures-per-page", default_value_t = 1)]
    pub measures_per_page: usize,

    /// Analysis frames per second of playback time.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Pace frames against the wall clock instead of running as fast as possible.
    #[arg(short, long, default_value_t = false)]
    pub realtime: bool,

    /// Delays the start of realtime playback by N seconds.
    #[arg(long = "delay-start", default_value_t = 0)]
    pub delay_start: u64,

    /// Emit frames as JSON lines on stdout instead of logging them.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// JSON file overriding the detector tuning.
    #[arg(long)]
    pub tuning: Option<PathBuf>,

    /// Dry run (print the measure map and first dry_run_max notes, then exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum notes to print in dry run.
    #[arg(long, default_value_t = 80)]
    pub dry_run_max: usize,

    /// Prints extra information to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn settings(&self) -> anyhow::Result<AnalysisSettings> {
        let percussion_channel = match self.percussion_channel {
            1..=16 => self.percussion_channel - 1,
            other => {
                warn!("Percussion channel {} is out of range, using 10..!", other);
                DEFAULT_PERCUSSION_CHANNEL
            }
        };

        Ok(AnalysisSettings {
            mode: parse_mode(&self.mode),
            key: parse_key_selection(self.key.as_deref(), self.scale.as_deref()),
            sensitivity: self.sensitivity,
            half_life: self.half_life,
            channel_mask: parse_channel_mask(&self.channel_mask)?,
            percussion_channel,
            measures_per_page: self.measures_per_page.max(1),
        })
    }
}
