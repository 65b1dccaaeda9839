use crate::engine::{Frame, FrameSink};
use anyhow::bail;
use log::{debug, info};
use std::sync::Mutex;

/// What was last written, so only changes reach the log.
#[derive(Debug, Default, Clone, PartialEq)]
struct Shown {
    measure: Option<usize>,
    key_name: String,
    label: String,
}

/// Logs measure changes, key changes and chord label changes at `info` level.
#[derive(Debug, Default)]
pub struct LogSink {
    verbose: bool,
    shown: Mutex<Shown>,
}

impl LogSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            shown: Mutex::new(Shown::default()),
        }
    }
}

impl FrameSink for LogSink {
    fn present(&self, frame: &Frame) -> anyhow::Result<()> {
        let Ok(mut shown) = self.shown.lock() else {
            bail!("Failed to lock the log sink state..!");
        };

        let measure = frame.measure.map(|m| m.index);
        if measure != shown.measure {
            if let (Some(m), Some(bar)) = (frame.measure, frame.bar) {
                info!(
                    "{:>9.3}s | bar {:>4} | {}/{} @ {:.1} BPM",
                    frame.time, bar.bar, m.numerator, m.denominator, m.bpm
                );
            }
            shown.measure = measure;
        }

        if frame.key_name != shown.key_name {
            info!(
                "{:>9.3}s | key   {} (confidence {:.2})",
                frame.time, frame.key_name, frame.key.confidence
            );
            shown.key_name = frame.key_name.clone();
        }

        if frame.label != shown.label {
            if self.verbose {
                if let Some(chord) = frame.chord.as_ref() {
                    info!(
                        "{:>9.3}s | chord {:<12} | {} ({:.2})",
                        frame.time, frame.label, chord.quality, chord.confidence
                    );
                } else {
                    info!("{:>9.3}s | chord ---", frame.time);
                }
            } else if !frame.label.is_empty() {
                info!("{:>9.3}s | chord {}", frame.time, frame.label);
            }
            shown.label = frame.label.clone();
        }

        Ok(())
    }

    fn finish(&self) -> anyhow::Result<()> {
        debug!("Log sink finished..!");
        Ok(())
    }
}
