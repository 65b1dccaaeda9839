use crate::engine::{Frame, FrameSink};
use anyhow::{anyhow, bail};
use std::io::Write;
use std::sync::Mutex;

/// Writes one JSON object per line whenever the measure, key or label changes.
pub struct JsonSink {
    out: Mutex<Box<dyn Write + Send>>,
    last: Mutex<Option<(Option<usize>, String, String)>>,
}

impl JsonSink {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            last: Mutex::new(None),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl FrameSink for JsonSink {
    fn present(&self, frame: &Frame) -> anyhow::Result<()> {
        let signature = (
            frame.measure.map(|m| m.index),
            frame.key_name.clone(),
            frame.label.clone(),
        );

        {
            let Ok(mut last) = self.last.lock() else {
                bail!("Failed to lock the json sink state..!");
            };
            if last.as_ref() == Some(&signature) {
                return Ok(());
            }
            *last = Some(signature);
        }

        let line =
            serde_json::to_string(frame).map_err(|e| anyhow!("Failed to encode frame: {}", e))?;

        let Ok(mut out) = self.out.lock() else {
            bail!("Failed to lock the json sink output..!");
        };
        writeln!(out, "{}", line)?;

        Ok(())
    }

    fn finish(&self) -> anyhow::Result<()> {
        let Ok(mut out) = self.out.lock() else {
            bail!("Failed to lock the json sink output..!");
        };
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::Analyzer;
    use crate::model::song::NoteEvent;
    use crate::timeline::MeasureMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_only_changed_frames() {
        let buf = SharedBuf::default();
        let sink = JsonSink::new(buf.clone());
        let measures = MeasureMap::build(&[], &[], 480, 4.0);
        let mut analyzer = Analyzer::default();

        for note in [55, 59, 62, 65] {
            analyzer.handle(&NoteEvent::note_on(note, 90, 0, 0.0));
        }

        let frame = analyzer.frame(0.5, &measures);
        sink.present(&frame).unwrap();
        sink.present(&analyzer.frame(0.6, &measures)).unwrap();
        sink.finish().unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["label"], "G7");
        assert_eq!(value["chord"]["quality"], "Dom7");
        assert_eq!(value["measure"]["index"], 0);
    }
}
