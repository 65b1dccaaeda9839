use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use midi_navigate::{
    AnalysisSettings, Args, EngineTuning, FrameSink, JsonSink, LogSink, MeasureMap,
    PlaybackOptions, Player, Song, import_midi_file, load_tuning, note_name,
};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let settings = args.settings()?;

    let tuning = match args.tuning.as_ref() {
        Some(path) => load_tuning(path)?,
        None => EngineTuning::default(),
    };

    info!("Importing MIDI file: '{}'...", args.midi.display());
    let song = import_midi_file(&args.midi, args.transpose)?;

    debug!(
        "Imported song '{}' with {} notes over {:.3}s..!",
        song.metadata
            .title
            .clone()
            .unwrap_or_else(|| "<unknown>".into()),
        song.notes.len(),
        song.duration
    );

    if args.dry_run {
        let measures = MeasureMap::build(
            &song.metadata.tempos,
            &song.metadata.meters,
            song.metadata.ppq,
            song.duration,
        );

        info!("{} measures..!", measures.len());
        for measure in measures.measures().iter().take(args.dry_run_max) {
            info!(
                "Measure {}: {:.3}s -> {:.3}s ({}/{} @ {:.1} BPM)",
                measure.index + 1,
                measure.start_time,
                measure.end_time,
                measure.numerator,
                measure.denominator,
                measure.bpm
            );
        }

        info!("Previewing at most {} notes..!", args.dry_run_max);
        for (i, note) in song.notes.iter().take(args.dry_run_max).enumerate() {
            info!(
                "Note {}: midi={} ({}) ch={} time={:.3}s dur={:.3}s",
                i,
                note.midi,
                note_name(note.midi % 12),
                note.channel + 1,
                note.time,
                note.duration
            );
        }
        return Ok(());
    }

    let options = PlaybackOptions {
        fps: args.fps,
        realtime: args.realtime,
        delay_start: args.delay_start,
        verbose: args.verbose,
    };

    if args.json {
        run(JsonSink::stdout(), &song, settings, tuning, options)
    } else {
        run(LogSink::new(args.verbose), &song, settings, tuning, options)
    }
}

fn run<S: FrameSink + 'static>(
    sink: S,
    song: &Song,
    settings: AnalysisSettings,
    tuning: EngineTuning,
    options: PlaybackOptions,
) -> Result<()> {
    let player = Arc::new(Player::new(sink, settings, tuning, options));
    player.load_song(song)?;

    let player_for_handler = Arc::clone(&player);
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping playback..!");
        let _ = player_for_handler.stop();
    })
    .expect("Error setting Ctrl-C handler..!");

    player.play(true)?;
    info!("Playback finished, exiting..!");

    Ok(())
}
