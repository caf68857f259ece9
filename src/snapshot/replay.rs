//! Replay of recorded observations.
//!
//! One JSON object per line, one line per tick:
//!
//! ```text
//! {"subject": {"x": 260, "y": 0, "w": 120, "h": 400}}
//! {"subject": {"x": 50, "y": 0, "w": 60, "h": 200}, "gestures": ["fist"]}
//! {"hands": [[[0.5, 0.4], [0.5, 0.5], ...21 points...]]}
//!
//! {}
//! ```
//!
//! A blank line is a tick without a frame. `hands` are classified with the
//! configured fist policy; `gestures` are taken as already classified.
//! Recorded boxes are in steering coordinates and are never mirrored.
//! End of file ends the session.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{DetectionSource, GestureSettings, Snapshot};
use crate::detect::{BoundingBox, Detection, HandGesture, HandLandmarks};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReplayRecord {
    #[serde(default)]
    subject: Option<BoundingBox>,
    #[serde(default)]
    hands: Vec<HandLandmarks>,
    #[serde(default)]
    gestures: Vec<HandGesture>,
}

pub struct ReplaySource {
    name: String,
    reader: Option<Box<dyn BufRead + Send>>,
    gestures: GestureSettings,
    line_no: u64,
    ticks_replayed: u64,
}

impl ReplaySource {
    pub fn open<P: AsRef<Path>>(path: P, gestures: GestureSettings) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        log::info!("ReplaySource: replaying {}", path.display());
        Ok(Self::from_reader(
            format!("replay://{}", path.display()),
            BufReader::new(file),
            gestures,
        ))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(
        name: impl Into<String>,
        reader: R,
        gestures: GestureSettings,
    ) -> Self {
        Self {
            name: name.into(),
            reader: Some(Box::new(reader)),
            gestures,
            line_no: 0,
            ticks_replayed: 0,
        }
    }

    pub fn ticks_replayed(&self) -> u64 {
        self.ticks_replayed
    }

    fn to_detection(&self, record: ReplayRecord) -> Detection {
        let mut gestures = self
            .gestures
            .policy
            .classify_all(&record.hands, self.gestures.max_hands);
        gestures.extend(record.gestures);
        gestures.truncate(self.gestures.max_hands);
        Detection {
            subject: record.subject,
            gestures,
        }
    }
}

impl DetectionSource for ReplaySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn poll(&mut self) -> Result<Snapshot> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Snapshot::Ended);
        };

        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("failed to read {}", self.name))?;
        if read == 0 {
            return Ok(Snapshot::Ended);
        }
        self.line_no += 1;
        self.ticks_replayed += 1;

        let line = line.trim();
        if line.is_empty() {
            return Ok(Snapshot::Pending);
        }
        let record: ReplayRecord = serde_json::from_str(line).map_err(|e| {
            anyhow!(
                "invalid replay record at {}:{}: {}",
                self.name,
                self.line_no,
                e
            )
        })?;
        Ok(Snapshot::Ready(self.to_detection(record)))
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            log::info!(
                "ReplaySource: released {} after {} ticks",
                self.name,
                self.ticks_replayed
            );
        }
    }
}
