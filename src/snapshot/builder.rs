use anyhow::{Context, Result};

use super::{DetectionSource, GestureSettings, Snapshot};
use crate::detect::{Detection, DetectorBackend, Observation};
use crate::frame::Capture;
use crate::ingest::FrameSource;

/// Builds one `Detection` per tick from a frame source and a detector.
///
/// The frame lives only inside `poll`: it is borrowed by the detector and
/// dropped before the snapshot is returned. With mirroring on, the subject
/// box is flipped as if the frame had been mirrored before detection.
pub struct SnapshotBuilder<F: FrameSource, B: DetectorBackend> {
    source: F,
    backend: B,
    gestures: GestureSettings,
    mirror: bool,
    detector_errors: u64,
    released: bool,
}

impl<F: FrameSource, B: DetectorBackend> SnapshotBuilder<F, B> {
    pub fn new(source: F, backend: B, gestures: GestureSettings) -> Self {
        Self {
            source,
            backend,
            gestures,
            mirror: false,
            detector_errors: 0,
            released: false,
        }
    }

    /// Connect the source and warm up the detector.
    pub fn connect(mut source: F, mut backend: B, gestures: GestureSettings) -> Result<Self> {
        source.connect().context("failed to connect frame source")?;
        backend
            .warm_up()
            .with_context(|| format!("failed to warm up detector {}", backend.name()))?;
        Ok(Self::new(source, backend, gestures))
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn detector_errors(&self) -> u64 {
        self.detector_errors
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    fn assemble(&self, observation: Observation, frame_width: u32) -> Detection {
        let subject = match observation.subject {
            Some(bbox) if self.mirror => Some(bbox.mirrored(frame_width)),
            subject => subject,
        };
        Detection {
            subject,
            gestures: self
                .gestures
                .policy
                .classify_all(&observation.hands, self.gestures.max_hands),
        }
    }
}

impl<F: FrameSource, B: DetectorBackend> DetectionSource for SnapshotBuilder<F, B> {
    fn describe(&self) -> String {
        format!("{} via {}", self.source.stats().url, self.backend.name())
    }

    fn poll(&mut self) -> Result<Snapshot> {
        let frame = match self.source.poll_frame()? {
            Capture::Frame(frame) => frame,
            Capture::Pending => return Ok(Snapshot::Pending),
            Capture::Ended => return Ok(Snapshot::Ended),
        };

        match self.backend.detect(&frame) {
            Ok(observation) => Ok(Snapshot::Ready(self.assemble(observation, frame.width))),
            Err(e) => {
                self.detector_errors += 1;
                log::warn!(
                    "detector {} failed on frame {}: {:#}",
                    self.backend.name(),
                    frame.sequence,
                    e
                );
                Ok(Snapshot::Pending)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
    }
}
