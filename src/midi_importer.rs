use crate::model::song::*;
use crate::timeline::TempoMap;
use anyhow::{Result, anyhow};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

struct NoteInterval {
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub velocity: u8,
    pub channel: u8,
}

pub fn import_midi_file<P: AsRef<Path>>(path: P, transpose_semitones: i32) -> Result<Song> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let mut song = import_midi_bytes(&bytes, transpose_semitones)?;
    if song.metadata.title.is_none() {
        song.metadata.title = path
            .as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }

    Ok(song)
}

/// Parses a Standard MIDI File into notes, tempo events and meter events, all tracks merged.
pub fn import_midi_bytes(bytes: &[u8], transpose_semitones: i32) -> Result<Song> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u32,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut title: Option<String> = None;
    let mut tempos: Vec<TempoEvent> = Vec::new();
    let mut meters: Vec<MeterEvent> = Vec::new();

    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
    let mut last_event_tick: u64 = 0;

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        if mpqn == 0 {
                            warn!(
                                "Ignoring zero tempo at tick {} (track {})..!",
                                abs_tick, track_idx
                            );
                            continue;
                        }
                        tempos.push(TempoEvent {
                            tick: abs_tick,
                            bpm: MICROSECONDS_PER_MINUTE / mpqn as f64,
                        });
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                    }
                    MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => {
                        let denominator = 1u32.checked_shl(*denominator_pow as u32).unwrap_or(0);
                        meters.push(MeterEvent {
                            tick: abs_tick,
                            numerator: *numerator as u32,
                            denominator,
                        });
                        debug!(
                            "Time signature at tick {} -> {}/{} (track {})",
                            abs_tick, numerator, denominator, track_idx
                        );
                    }
                    MetaMessage::TrackName(bytes) => {
                        if title.is_none() {
                            let name = String::from_utf8_lossy(bytes).trim().to_owned();
                            if !name.is_empty() {
                                debug!("Track name: {}", name);
                                title = Some(name);
                            }
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(
                                    &mut open_notes,
                                    &mut intervals,
                                    ch,
                                    key.as_int(),
                                    abs_tick,
                                );
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        last_event_tick = last_event_tick.max(abs_tick);
    }

    let last_tick_estimate = intervals
        .iter()
        .map(|interval| interval.end_tick)
        .max()
        .unwrap_or(0)
        .max(last_event_tick);

    for ((ch, key), stack) in open_notes.into_iter() {
        for (start_tick, start_vel) in stack {
            let end_tick = if last_tick_estimate > start_tick {
                last_tick_estimate
            } else {
                start_tick + ticks_per_quarter as u64
            };

            intervals.push(NoteInterval {
                midi: key,
                start_tick,
                end_tick,
                velocity: start_vel,
                channel: ch,
            });

            warn!(
                "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                key, ch, start_tick, end_tick
            );
        }
    }

    let tempo_map = TempoMap::build(&tempos, ticks_per_quarter);

    let mut notes: Vec<NoteSpan> = Vec::with_capacity(intervals.len());
    for interval in intervals.into_iter() {
        let note_id = interval.midi as i32 + transpose_semitones;
        if !(0..=127).contains(&note_id) {
            warn!("Dropping out-of-range MIDI {} after transpose..!", note_id);
            continue;
        }

        if interval.end_tick <= interval.start_tick {
            debug!(
                "Skipping zero-length midi note {} at tick {}..!",
                interval.midi, interval.start_tick
            );
            continue;
        }

        let time = tempo_map.ticks_to_seconds(interval.start_tick);
        let end = tempo_map.ticks_to_seconds(interval.end_tick);

        notes.push(NoteSpan {
            midi: note_id as u8,
            velocity: interval.velocity,
            channel: interval.channel,
            start_tick: interval.start_tick,
            end_tick: interval.end_tick,
            time,
            duration: end - time,
        });
    }

    notes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.midi.cmp(&b.midi)));

    let duration = notes
        .iter()
        .map(NoteSpan::end_time)
        .fold(0.0, f64::max);

    debug!(
        "Imported {} note(s), {} tempo event(s), {} meter event(s), {:.3}s..!",
        notes.len(),
        tempos.len(),
        meters.len(),
        duration
    );

    Ok(Song {
        metadata: Metadata {
            title,
            ppq: ticks_per_quarter,
            tempos,
            meters,
        },
        notes,
        duration,
    })
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    match open_notes.get_mut(&(ch, midi_num)).and_then(|stack| stack.pop()) {
        Some((start_tick, start_vel)) => intervals.push(NoteInterval {
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
            velocity: start_vel,
            channel: ch,
        }),
        None => debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        ),
    }
}
