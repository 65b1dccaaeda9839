use crate::model::song::{Measure, MeterEvent, TempoEvent};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BPM: f64 = 120.0;

/// Measures keep being generated this long past the nominal end of the piece.
const TRAILING_GUARD_S: f64 = 5.0;

/// Hard ceiling on generated measures, for degenerate meters that barely advance time.
const MAX_MEASURES: usize = 100_000;

/// A tempo change anchored in both tick and second space.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TempoPoint {
    pub time: f64,
    pub bpm: f64,
    pub tick: u64,
}

/// Piecewise-constant tempo timeline for one loaded piece.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: u32,
    points: Vec<TempoPoint>,
}

impl TempoMap {
    /// Walks the tempo events in tick order, accumulating elapsed seconds at every change.
    ///
    /// The map always starts with a point at tick 0: if no event sits there, 120 BPM is assumed
    /// until the first declared change. Events with a non-positive or non-finite BPM are dropped.
    pub fn build(events: &[TempoEvent], ppq: u32) -> Self {
        let ppq = ppq.max(1);

        let mut sorted: Vec<TempoEvent> = events
            .iter()
            .filter(|event| {
                let ok = event.bpm.is_finite() && event.bpm > 0.0;
                if !ok {
                    warn!("Skipping invalid tempo {} BPM at tick {}..!", event.bpm, event.tick);
                }
                ok
            })
            .copied()
            .collect();

        // stable, so of several events on one tick the last declared wins lookups
        sorted.sort_by_key(|event| event.tick);

        let mut points: Vec<TempoPoint> = Vec::with_capacity(sorted.len() + 1);
        if sorted.first().is_none_or(|first| first.tick > 0) {
            points.push(TempoPoint {
                time: 0.0,
                bpm: DEFAULT_BPM,
                tick: 0,
            });
        }

        let mut last_tick: u64 = 0;
        let mut last_bpm: f64 = DEFAULT_BPM;
        let mut time: f64 = 0.0;

        for event in sorted {
            time += ticks_span_seconds((event.tick - last_tick) as f64, last_bpm, ppq);

            points.push(TempoPoint {
                time,
                bpm: event.bpm,
                tick: event.tick,
            });

            last_tick = event.tick;
            last_bpm = event.bpm;
        }

        debug!("Built tempo map with {} point(s) at {} PPQ", points.len(), ppq);

        Self { ppq, points }
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    /// The last point at or before `tick`.
    pub fn point_at(&self, tick: u64) -> &TempoPoint {
        let idx = self.points.partition_point(|point| point.tick <= tick);
        &self.points[idx.saturating_sub(1)]
    }

    pub fn bpm_at(&self, tick: u64) -> f64 {
        self.point_at(tick).bpm
    }

    /// Converts an absolute tick to seconds. Non-decreasing in `tick`.
    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        self.seconds_at(tick as f64)
    }

    /// Like [`TempoMap::ticks_to_seconds`], for positions between whole ticks.
    pub fn seconds_at(&self, tick: f64) -> f64 {
        let idx = self.points.partition_point(|point| point.tick as f64 <= tick);
        let point = &self.points[idx.saturating_sub(1)];
        let span = (tick - point.tick as f64).max(0.0);
        point.time + ticks_span_seconds(span, point.bpm, self.ppq)
    }
}

fn ticks_span_seconds(ticks: f64, bpm: f64, ppq: u32) -> f64 {
    ticks * 60.0 / (bpm * ppq as f64)
}

/// Sorted, validated meter list that always starts with a meter at tick 0.
fn normalize_meters(events: &[MeterEvent]) -> Vec<MeterEvent> {
    let mut meters: Vec<MeterEvent> = events
        .iter()
        .filter(|meter| {
            if !meter.is_valid() {
                warn!(
                    "Skipping invalid meter {}/{} at tick {}..!",
                    meter.numerator, meter.denominator, meter.tick
                );
            }
            meter.is_valid()
        })
        .copied()
        .collect();

    meters.sort_by_key(|meter| meter.tick);

    if meters.first().is_none_or(|first| first.tick > 0) {
        meters.insert(0, MeterEvent::COMMON_TIME);
    }

    meters
}

/// Contiguous bar boundaries of a piece, in playback order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureMap {
    measures: Vec<Measure>,
}

impl MeasureMap {
    /// Lays out measures from tick 0 until the time passes `total_duration` (plus a short tail),
    /// each measure spanning `numerator * (4 / denominator)` quarter notes of the meter active at
    /// its first tick.
    pub fn build(
        tempos: &[TempoEvent],
        meters: &[MeterEvent],
        ppq: u32,
        total_duration: f64,
    ) -> Self {
        let tempo_map = TempoMap::build(tempos, ppq);
        Self::build_with(&tempo_map, meters, total_duration)
    }

    pub fn build_with(tempo_map: &TempoMap, meters: &[MeterEvent], total_duration: f64) -> Self {
        let meters = normalize_meters(meters);
        let ppq = tempo_map.ppq() as f64;

        let mut measures: Vec<Measure> = Vec::new();
        let mut meter_idx = 0;
        // fractional: short meters at low PPQ span less than a whole tick per beat
        let mut current_tick: f64 = 0.0;
        let mut current_time: f64 = 0.0;

        while current_time <= total_duration + TRAILING_GUARD_S {
            if measures.len() >= MAX_MEASURES {
                warn!(
                    "Measure map hit the ceiling of {} measures at {:.3}s, stopping early..!",
                    MAX_MEASURES, current_time
                );
                break;
            }

            while meter_idx + 1 < meters.len()
                && current_tick >= meters[meter_idx + 1].tick as f64
            {
                meter_idx += 1;
            }

            let meter = meters[meter_idx];
            let ticks_per_measure = meter.numerator as f64 * ppq * 4.0 / meter.denominator as f64;

            let start_time = tempo_map.seconds_at(current_tick);
            let end_time = tempo_map.seconds_at(current_tick + ticks_per_measure);
            let start_tick = current_tick.floor() as u64;

            measures.push(Measure {
                index: measures.len(),
                start_time,
                end_time,
                duration: end_time - start_time,
                start_tick,
                numerator: meter.numerator,
                denominator: meter.denominator,
                bpm: tempo_map.bpm_at(start_tick),
            });

            current_tick += ticks_per_measure;
            current_time = end_time;
        }

        debug!(
            "Built measure map with {} measure(s) for {:.3}s",
            measures.len(),
            total_duration
        );

        Self { measures }
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    /// The measure whose `[start_time, end_time)` contains `time`.
    ///
    /// Times past the end clamp to the last measure and times before the start clamp to the
    /// first, so playback running slightly long never leaves consumers without a bar. `None` only
    /// for an empty map.
    pub fn measure_at(&self, time: f64) -> Option<&Measure> {
        let idx = self
            .measures
            .partition_point(|measure| measure.start_time <= time);
        self.measures.get(idx.saturating_sub(1))
    }

    /// Position of `time` inside its measure, for a bar/beat readout.
    pub fn bar_position(&self, time: f64) -> Option<BarPosition> {
        let measure = self.measure_at(time)?;

        let progress = if measure.duration > 0.0 {
            ((time - measure.start_time) / measure.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let beat_index = ((progress * measure.numerator as f64).floor() as u32)
            .min(measure.numerator.saturating_sub(1));

        Some(BarPosition {
            bar: measure.index + 1,
            beat_index,
            beats_per_bar: measure.numerator,
            denominator: measure.denominator,
            progress,
        })
    }

    /// The page of `measures_per_page` consecutive measures containing `time`.
    pub fn page_at(&self, time: f64, measures_per_page: usize) -> Option<Page> {
        let per_page = measures_per_page.max(1);
        let measure = self.measure_at(time)?;

        let index = measure.index / per_page;
        let first_measure = index * per_page;
        let last_measure = (first_measure + per_page).min(self.measures.len());

        Some(Page {
            index,
            first_measure,
            last_measure,
            start_time: self.measures[first_measure].start_time,
            end_time: self.measures[last_measure - 1].end_time,
        })
    }
}

/// 1-based bar number and 0-based beat inside it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BarPosition {
    pub bar: usize,
    pub beat_index: u32,
    pub beats_per_bar: u32,
    pub denominator: u32,
    /// Fraction of the bar already elapsed.
    pub progress: f64,
}

/// A run of measures displayed together; `last_measure` is exclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub index: usize,
    pub first_measure: usize,
    pub last_measure: usize,
    pub start_time: f64,
    pub end_time: f64,
}
