use crate::engine::{AnalysisSettings, Analyzer, FrameSink};
use crate::model::song::{NoteEvent, NoteEventKind, Song};
use crate::model::tuning::EngineTuning;
use crate::timeline::MeasureMap;
use anyhow::{anyhow, bail};
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_SLEEP_CHUNK_S: f64 = 0.050;

/// Events this close to a frame's time are delivered with that frame.
const TIME_EPSILON_S: f64 = 1e-9;

enum ControlMsg {
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Frames per second of transport time.
    pub fps: f64,
    /// Pace frames against the wall clock; otherwise run as fast as possible.
    pub realtime: bool,
    /// Seconds to wait before the first frame in realtime mode.
    pub delay_start: u64,
    pub verbose: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            realtime: false,
            delay_start: 0,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Loaded {
    measures: MeasureMap,
    schedule: Vec<NoteEvent>,
    duration: f64,
}

/// Drives an [`Analyzer`] along a loaded piece on a worker thread, handing every frame to a sink.
pub struct Player<S: FrameSink> {
    options: PlaybackOptions,
    sink: Arc<S>,
    analyzer: Mutex<Analyzer>,
    loaded: Mutex<Option<Loaded>>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<anyhow::Result<()>>>>,
}

impl<S: FrameSink + 'static> Player<S> {
    pub fn new(
        sink: S,
        settings: AnalysisSettings,
        tuning: EngineTuning,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            options,
            sink: Arc::new(sink),
            analyzer: Mutex::new(Analyzer::new(settings, tuning)),
            loaded: Mutex::new(None),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Builds the measure map and the note-on/note-off schedule for `song`.
    pub fn load_song(&self, song: &Song) -> anyhow::Result<MeasureMap> {
        let measures = MeasureMap::build(
            &song.metadata.tempos,
            &song.metadata.meters,
            song.metadata.ppq,
            song.duration,
        );

        let schedule = build_schedule(song);

        let Ok(mut loaded) = self.loaded.lock() else {
            bail!("Failed to lock the loaded song..!");
        };

        info!(
            "Loaded song: '{}' with {} measures and {} scheduled events..!",
            song.metadata.title.as_deref().unwrap_or("No Title"),
            measures.len(),
            schedule.len()
        );

        *loaded = Some(Loaded {
            measures: measures.clone(),
            schedule,
            duration: song.duration,
        });

        Ok(measures)
    }

    pub fn play(&self, join: bool) -> anyhow::Result<()> {
        {
            let Ok(guard) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
                bail!("Playback already running..!")
            }
        }

        let loaded = {
            let Ok(loaded) = self.loaded.lock() else {
                bail!("Failed to lock the loaded song..!")
            };
            let Some(loaded) = loaded.clone() else {
                bail!("No song loaded..!")
            };
            loaded
        };

        if !(self.options.fps.is_finite() && self.options.fps > 0.0) {
            bail!("Invalid frame rate: {}..!", self.options.fps);
        }

        let mut analyzer = {
            let Ok(analyzer) = self.analyzer.lock() else {
                bail!("Failed to lock the analyzer..!")
            };
            analyzer.clone()
        };
        analyzer.reset_notes();

        let sink = Arc::clone(&self.sink);
        let (tx, rx) = mpsc::channel::<ControlMsg>();

        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };

            *ctl = Some(tx);
        }

        let options = self.options;
        let handle = thread::spawn(move || run(loaded, analyzer, sink.as_ref(), options, rx));

        if join {
            let result = handle
                .join()
                .map_err(|_| anyhow!("Playback thread panicked..!"))?;
            if let Ok(mut ctl) = self.control_tx.lock() {
                ctl.take();
            }
            result?;
        } else {
            let Ok(mut wh) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            *wh = Some(handle);
        }

        Ok(())
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        let tx = {
            let Ok(mut lock) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };
            lock.take()
        };

        if let Some(tx) = tx {
            let _ = tx.send(ControlMsg::Stop);
        } else {
            bail!("No worker is running playback..!")
        }

        let Ok(mut lock) = self.worker_handle.lock() else {
            bail!("Failed to lock worker_handle..!")
        };

        if let Some(handle) = lock.take() {
            let result = handle
                .join()
                .map_err(|_| anyhow!("Playback thread panicked..!"))?;
            debug!("Playback thread joined..!");
            info!("Stopped playback thread..!");
            result?;
        }

        Ok(())
    }

    /// Blocks until a non-joined playback finishes on its own.
    pub fn wait(&self) -> anyhow::Result<()> {
        let handle = {
            let Ok(mut lock) = self.worker_handle.lock() else {
                bail!("Failed to lock worker_handle..!")
            };
            lock.take()
        };

        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("Playback thread panicked..!"))??;
        }

        if let Ok(mut ctl) = self.control_tx.lock() {
            ctl.take();
        }

        Ok(())
    }
}

/// Note-ons at span starts and note-offs at span ends, time-ordered with releases first on ties.
pub fn build_schedule(song: &Song) -> Vec<NoteEvent> {
    let mut schedule: Vec<NoteEvent> = Vec::with_capacity(song.notes.len() * 2);

    for span in song.notes.iter() {
        schedule.push(NoteEvent::note_on(span.midi, span.velocity, span.channel, span.time));
        schedule.push(NoteEvent::note_off(span.midi, span.channel, span.end_time()));
    }

    schedule.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then_with(|| release_first(a).cmp(&release_first(b)))
    });

    schedule
}

fn release_first(event: &NoteEvent) -> u8 {
    match event.kind {
        NoteEventKind::NoteOff => 0,
        NoteEventKind::NoteOn => 1,
    }
}

fn stop_requested(ctrl_rx: &Receiver<ControlMsg>) -> bool {
    matches!(ctrl_rx.try_recv(), Ok(ControlMsg::Stop))
}

fn run<S: FrameSink>(
    loaded: Loaded,
    mut analyzer: Analyzer,
    sink: &S,
    options: PlaybackOptions,
    ctrl_rx: Receiver<ControlMsg>,
) -> anyhow::Result<()> {
    let frame_dt = 1.0 / options.fps;
    let last_frame = (loaded.duration.max(0.0) * options.fps).ceil() as u64;

    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    if options.realtime {
        info!(
            "Starting playback {}..!",
            if options.delay_start > 0 {
                format!("in {} seconds", options.delay_start)
            } else {
                "now".to_owned()
            }
        );

        if options.delay_start > 0 {
            sleeper.sleep(Duration::from_secs(options.delay_start));
        }
    }

    let start = Instant::now();
    let mut next_event = 0usize;
    let mut previous_time = 0.0;

    for frame_idx in 0..=last_frame {
        let time = (frame_idx as f64 * frame_dt).min(loaded.duration.max(0.0));

        if options.realtime {
            let target = start + Duration::from_secs_f64(time);
            loop {
                if stop_requested(&ctrl_rx) {
                    warn!("Playback stopped during wait..!");
                    return sink.finish();
                }

                let now = Instant::now();
                if now >= target {
                    break;
                }
                let remaining = (target - now).as_secs_f64();
                sleeper.sleep(Duration::from_secs_f64(remaining.min(MAX_SLEEP_CHUNK_S)));
            }
        } else if stop_requested(&ctrl_rx) {
            warn!("Playback stopped via control message at {:.3}s..!", time);
            return sink.finish();
        }

        while let Some(event) = loaded.schedule.get(next_event) {
            if event.timestamp > time + TIME_EPSILON_S {
                break;
            }
            analyzer.handle(event);
            next_event += 1;
        }

        analyzer.advance(time - previous_time);
        previous_time = time;

        let frame = analyzer.frame(time, &loaded.measures);
        if options.verbose {
            debug!(
                "Frame {} at {:.3}s | {} held | label '{}'",
                frame_idx,
                time,
                analyzer.active_notes().len(),
                frame.label
            );
        }

        sink.present(&frame)?;
    }

    info!("Playback thread finished all frames..!");
    sink.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::Frame;
    use crate::model::song::{Metadata, NoteSpan};

    #[derive(Default)]
    struct CollectingSink {
        frames: Mutex<Vec<Frame>>,
        finished: Mutex<bool>,
    }

    impl FrameSink for CollectingSink {
        fn present(&self, frame: &Frame) -> anyhow::Result<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn finish(&self) -> anyhow::Result<()> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }
    }

    fn span(midi: u8, time: f64, duration: f64) -> NoteSpan {
        NoteSpan {
            midi,
            velocity: 100,
            channel: 0,
            start_tick: (time * 960.0) as u64,
            end_tick: ((time + duration) * 960.0) as u64,
            time,
            duration,
        }
    }

    /// C major for one second, then G7 for one second, at 120 BPM.
    fn cadence() -> Song {
        let mut notes = Vec::new();
        for midi in [60, 64, 67] {
            notes.push(span(midi, 0.0, 1.0));
        }
        for midi in [55, 59, 62, 65] {
            notes.push(span(midi, 1.0, 1.0));
        }

        Song {
            metadata: Metadata {
                title: Some(String::from("Cadence")),
                ppq: 480,
                ..Default::default()
            },
            notes,
            duration: 2.0,
        }
    }

    fn label_at(frames: &[Frame], time: f64) -> String {
        frames
            .iter()
            .find(|frame| (frame.time - time).abs() < 1e-6)
            .map(|frame| frame.label.clone())
            .unwrap_or_default()
    }

    #[test]
    fn releases_sort_before_attacks() {
        let schedule = build_schedule(&cadence());
        assert_eq!(schedule.len(), 14);

        let at_one: Vec<NoteEventKind> = schedule
            .iter()
            .filter(|event| event.timestamp == 1.0)
            .map(|event| event.kind)
            .collect();
        assert_eq!(at_one.len(), 7);
        assert!(at_one[..3].iter().all(|kind| *kind == NoteEventKind::NoteOff));
        assert!(at_one[3..].iter().all(|kind| *kind == NoteEventKind::NoteOn));
    }

    #[test]
    fn simulated_playback_presents_every_frame() {
        env_logger::try_init().unwrap_or(());

        let options = PlaybackOptions {
            fps: 10.0,
            ..Default::default()
        };
        let player = Player::new(
            CollectingSink::default(),
            AnalysisSettings::default(),
            EngineTuning::default(),
            options,
        );

        let measures = player.load_song(&cadence()).unwrap();
        assert_eq!(measures.measures()[0].start_time, 0.0);
        assert!(player.play(true).is_ok());

        let frames = player.sink().frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 21);
        assert_eq!(label_at(&frames, 0.5), "C");
        assert_eq!(label_at(&frames, 1.0), "G7");
        assert_eq!(label_at(&frames, 1.5), "G7");
        assert_eq!(label_at(&frames, 2.0), "");
        assert_eq!(frames[5].measure.map(|m| m.index), Some(0));
        assert!(*player.sink().finished.lock().unwrap());
    }

    #[test]
    fn play_without_a_song_fails() {
        let player = Player::new(
            CollectingSink::default(),
            AnalysisSettings::default(),
            EngineTuning::default(),
            PlaybackOptions::default(),
        );

        assert!(player.play(true).is_err());
        assert!(player.stop().is_err());
    }

    #[test]
    fn realtime_playback_can_be_stopped() {
        env_logger::try_init().unwrap_or(());

        let mut song = cadence();
        song.duration = 30.0;

        let options = PlaybackOptions {
            fps: 20.0,
            realtime: true,
            ..Default::default()
        };
        let player = Player::new(
            CollectingSink::default(),
            AnalysisSettings::default(),
            EngineTuning::default(),
            options,
        );

        player.load_song(&song).unwrap();
        assert!(player.play(false).is_ok());
        assert!(player.play(false).is_err());

        thread::sleep(Duration::from_millis(200));
        assert!(player.stop().is_ok());

        let frames = player.sink().frames.lock().unwrap().len();
        assert!(frames >= 1);
        assert!(frames < 600);
        assert!(*player.sink().finished.lock().unwrap());
    }
}
