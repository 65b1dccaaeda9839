pub mod engine;
pub mod midi_importer;
pub mod model;
pub mod player;
pub mod timeline;
pub mod util;

pub use engine::chord::{ActiveNotes, ChordDetector, ChordEstimate};
pub use engine::json_sink::JsonSink;
pub use engine::key::{KeyDetector, KeyEstimate, Tonality};
pub use engine::log_sink::LogSink;
pub use engine::roman::to_roman;
pub use engine::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::song::*;
pub use model::theory::*;
pub use model::tuning::*;
pub use player::*;
pub use timeline::*;
pub use util::*;
