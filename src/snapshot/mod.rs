//! Per-tick detection snapshots.
//!
//! A `DetectionSource` answers one poll per tick with a ready `Detection`,
//! nothing (the tick is skipped), or end of stream. Two implementations:
//! - `SnapshotBuilder`: frame source + detector + fist classifier
//! - `ReplaySource`: recorded observations from a JSON-lines file

mod builder;
mod replay;

use anyhow::{anyhow, Result};

use crate::detect::{Detection, FistPolicy, StubBackend};
use crate::ingest::{SourceSettings, SyntheticSource};

pub use builder::SnapshotBuilder;
pub use replay::ReplaySource;

/// Outcome of polling a detection source once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot {
    Ready(Detection),
    /// No frame this tick. Not an error.
    Pending,
    /// The source is exhausted; the session ends normally.
    Ended,
}

/// Gesture settings applied while building snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GestureSettings {
    /// Hands beyond this count are ignored.
    pub max_hands: usize,
    pub policy: FistPolicy,
}

pub const DEFAULT_MAX_HANDS: usize = 2;
pub const MAX_TRACKED_HANDS: usize = 4;

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            max_hands: DEFAULT_MAX_HANDS,
            policy: FistPolicy::default(),
        }
    }
}

/// Source of per-tick detections.
pub trait DetectionSource {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    /// Poll once. Errors are unrecoverable source failures.
    fn poll(&mut self) -> Result<Snapshot>;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Release camera and detector resources. Must be idempotent.
    fn release(&mut self);
}

impl<S: DetectionSource + ?Sized> DetectionSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn poll(&mut self) -> Result<Snapshot> {
        (**self).poll()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Open the detection source named by `settings.url`.
///
/// - `stub://<name>`: synthetic frames through the idle stub detector
/// - `replay://<path>`: recorded observations
pub fn open_detection_source(
    settings: &SourceSettings,
    gestures: GestureSettings,
) -> Result<Box<dyn DetectionSource + Send>> {
    if settings.url.starts_with("stub://") {
        let source = SyntheticSource::new(settings.clone())?;
        let builder = SnapshotBuilder::connect(source, StubBackend::new(), gestures)?
            .with_mirror(settings.mirror);
        return Ok(Box::new(builder));
    }
    if let Some(path) = settings.url.strip_prefix("replay://") {
        if path.trim().is_empty() {
            return Err(anyhow!("replay source requires a file path"));
        }
        return Ok(Box::new(ReplaySource::open(path, gestures)?));
    }
    Err(anyhow!(
        "unsupported source url '{}': expected stub://<name> or replay://<path>",
        settings.url
    ))
}
